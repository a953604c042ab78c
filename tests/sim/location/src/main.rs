//! Scripted end-to-end simulation for geotag-location.
//!
//! Plays a GPS warm-up against the session runtime: a stale fix, an invalid
//! fix, then steadily improving accuracy until the goal is reached, an
//! address resolves, and the fix is tagged and saved.
//!
//! Run with: cargo run -p geotag-location-sim

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;

use geotag_geocode::{Coordinate, GeocodeError, Geocoder, Placemark};
use geotag_location::session::{FixDelegate, FixEvent, FixSession};
use geotag_location::{
    AcquirerConfig, PositionReading, SensingBackend, SensingConfig, SensingDelegate, SensingError,
    SensingEvent,
};
use geotag_permission::{FixedPermissions, Permission, PermissionBackend, PermissionStatus};
use geotag_store::{Category, LocationStore, MemoryStore, TaggedLocation};

const HARBOR: Coordinate = Coordinate::new(53.545833, 9.966111);

fn harbor_placemark() -> Placemark {
    Placemark::new()
        .street_number("2")
        .street("Bei den St. Pauli-Landungsbrücken")
        .locality("Hamburg")
        .postal_code("20359")
        .country("Germany")
}

struct SimBackend {
    delegate: Mutex<Option<Arc<dyn SensingDelegate>>>,
    authorization: Mutex<PermissionStatus>,
}

impl SimBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delegate: Mutex::new(None),
            authorization: Mutex::new(PermissionStatus::NotDetermined),
        })
    }

    fn set_authorization(&self, status: PermissionStatus) {
        *self.authorization.lock().expect("poisoned authorization") = status;
    }

    fn emit(&self, event: SensingEvent) {
        if let Some(delegate) = self.delegate.lock().expect("poisoned delegate").clone() {
            delegate.on_event(event);
        }
    }
}

impl SensingBackend for SimBackend {
    fn authorization(&self) -> PermissionStatus {
        *self.authorization.lock().expect("poisoned authorization")
    }

    fn services_enabled(&self) -> bool {
        true
    }

    fn set_delegate(&self, delegate: Arc<dyn SensingDelegate>) {
        *self.delegate.lock().expect("poisoned delegate") = Some(delegate);
    }

    fn start_updates(&self, config: SensingConfig) -> Result<(), SensingError> {
        println!("[gps] updates started (aiming for {}m)", config.accuracy_hint);
        Ok(())
    }

    fn stop_updates(&self) {
        println!("[gps] updates stopped");
    }
}

struct SimGeocoder;

impl Geocoder for SimGeocoder {
    fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> BoxFuture<'static, Result<Vec<Placemark>, GeocodeError>> {
        println!("[geo] reverse geocoding {coordinate}");
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(vec![harbor_placemark()])
        }
        .boxed()
    }
}

struct PrintDelegate {
    events: async_channel::Sender<FixEvent>,
}

impl FixDelegate for PrintDelegate {
    fn on_event(&self, event: FixEvent) {
        match &event {
            FixEvent::AuthorizationRequired => println!("[ui] authorization required"),
            FixEvent::AuthorizationDenied => println!("[ui] authorization denied"),
            FixEvent::StatusChanged(snapshot) => {
                println!(
                    "[ui] {:<28} address: {}",
                    snapshot.message,
                    snapshot.address.replace('\n', " / ")
                );
            }
            FixEvent::FirstAddressResolved => println!("[ui] *chime* first address resolved"),
            FixEvent::Stopped(reason) => println!("[ui] session stopped: {reason:?}"),
        }
        let _ = self.events.try_send(event);
    }
}

#[tokio::main]
async fn main() {
    println!("=== Geotag Location Simulation ===\n");

    let backend = SimBackend::new();
    let (event_tx, event_rx) = async_channel::unbounded();
    let (session, pump) = FixSession::new(
        backend.clone(),
        Arc::new(SimGeocoder),
        Arc::new(PrintDelegate { events: event_tx }),
        AcquirerConfig::default(),
    );
    tokio::spawn(pump.run());

    session.start();

    // GPS warm-up: a cached fix, a garbage fix, then improving accuracy.
    let script: &[(Duration, PositionReading)] = &[
        (
            Duration::from_millis(100),
            PositionReading::taken_at(HARBOR, 60.0, Instant::now() - Duration::from_secs(30)),
        ),
        (
            Duration::from_millis(200),
            PositionReading::new(HARBOR, -1.0),
        ),
        (
            Duration::from_millis(300),
            PositionReading::new(HARBOR, 85.0),
        ),
        (
            Duration::from_millis(400),
            PositionReading::new(HARBOR, 35.0),
        ),
        (
            Duration::from_millis(900),
            PositionReading::new(HARBOR, 8.0),
        ),
    ];
    {
        let backend = backend.clone();
        let script = script.to_vec();
        tokio::spawn(async move {
            for (delay, reading) in script {
                tokio::time::sleep(delay).await;
                backend.emit(SensingEvent::Reading(reading));
            }
        });
    }

    // Wait for the session to stop and the final address to land, answering
    // the permission prompt on the way.
    let permissions = FixedPermissions::new().granting(Permission::Location);
    let mut last_snapshot = None;
    while let Ok(event) = event_rx.recv().await {
        match event {
            FixEvent::AuthorizationRequired => {
                let status = permissions
                    .request(Permission::Location)
                    .await
                    .expect("fixed permissions cannot fail");
                println!("[ui] permission prompt answered: {status:?}");
                backend.set_authorization(status);
                session.start();
            }
            FixEvent::StatusChanged(snapshot) => {
                let done = !snapshot.acquiring && snapshot.address.contains("Landungsbrücken");
                last_snapshot = Some(snapshot);
                if done {
                    break;
                }
            }
            _ => {}
        }
    }

    let snapshot = last_snapshot.expect("session produced no snapshots");
    let coordinate = snapshot.coordinate.expect("session stopped with a fix");
    println!("\nFinal fix: {coordinate} (±{}m)", snapshot.accuracy.unwrap_or_default());

    // Tag it the way the capture flow would.
    let store = MemoryStore::new();
    let record = TaggedLocation::new(
        "harbor ferry stop",
        Category::new("Landmark").expect("catalog name"),
        coordinate,
    )
    .with_placemark(harbor_placemark());
    store.save(&record).expect("memory save cannot fail");

    let saved = &store.all().expect("memory read cannot fail")[0];
    println!("Tagged: \"{}\" ({})", saved.description, saved.category);
    println!("        {}", saved.address_line());

    session.shutdown();
}
