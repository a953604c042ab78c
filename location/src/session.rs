//! Async session runtime.
//!
//! [`FixSession`] is the handle a host drives; [`SessionPump`] is the task
//! that owns the [`FixAcquirer`] and serializes everything it consumes:
//! sensing events forwarded from the backend, caller commands, the session
//! deadline, and geocode completions all arrive on one loop, so the state
//! machine never sees concurrent calls.

use std::fmt;
use std::sync::Arc;

use async_channel::{Receiver, Sender, unbounded};
use futures::future::{BoxFuture, Fuse};
use futures::{FutureExt, StreamExt};
use futures_timer::Delay;
use geotag_geocode::Geocoder;
use geotag_permission::PermissionStatus;
use log::{debug, warn};

use crate::acquirer::{
    AcquirerConfig, Directive, FixAcquirer, FixSnapshot, GeocodeCompletion, SessionId, StopReason,
};
use crate::{SensingBackend, SensingDelegate, SensingEvent};

/// Presentation-facing events emitted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum FixEvent {
    /// Authorization has not been requested yet; ask the user before starting.
    AuthorizationRequired,
    /// Authorization is denied or restricted; acquisition cannot start.
    AuthorizationDenied,
    /// State changed; the snapshot carries the current labels.
    StatusChanged(FixSnapshot),
    /// The session resolved its first address.
    FirstAddressResolved,
    /// The session stopped.
    Stopped(StopReason),
}

/// Receiver for session events.
///
/// Called on the pump task; implementations should hand off quickly.
pub trait FixDelegate: Send + Sync {
    /// Called for every session event.
    fn on_event(&self, event: FixEvent);
}

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    Shutdown,
}

/// Handle controlling a running [`SessionPump`].
///
/// Clone freely; all handles feed the same pump.
#[derive(Debug, Clone)]
pub struct FixSession {
    commands: Sender<Command>,
}

impl FixSession {
    /// Create a session and the pump that drives it.
    ///
    /// The pump must be spawned on an executor; it runs until
    /// [`FixSession::shutdown`] is called or every handle is dropped.
    pub fn new(
        sensing: Arc<dyn SensingBackend>,
        geocoder: Arc<dyn Geocoder>,
        delegate: Arc<dyn FixDelegate>,
        config: AcquirerConfig,
    ) -> (Self, SessionPump) {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        sensing.set_delegate(Arc::new(ChannelSensingDelegate { sender: event_tx }));

        let acquirer = FixAcquirer::new(sensing.clone(), config);
        (
            Self {
                commands: command_tx,
            },
            SessionPump {
                acquirer,
                sensing,
                geocoder,
                delegate,
                commands: command_rx,
                events: event_rx,
            },
        )
    }

    /// Request acquisition start.
    ///
    /// The pump checks authorization first and reports
    /// [`FixEvent::AuthorizationRequired`] or [`FixEvent::AuthorizationDenied`]
    /// instead of starting when location access is not granted.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stop the running acquisition session, keeping the best fix visible.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Stop the pump task entirely.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.commands.try_send(command).is_err() {
            warn!("session pump is gone; dropping command");
        }
    }
}

struct ChannelSensingDelegate {
    sender: Sender<SensingEvent>,
}

impl SensingDelegate for ChannelSensingDelegate {
    fn on_event(&self, event: SensingEvent) {
        if let Err(err) = self.sender.try_send(event) {
            warn!("dropping sensing event: {err}");
        }
    }
}

type GeocodeFuture = Fuse<BoxFuture<'static, GeocodeCompletion>>;

enum Step {
    Deadline,
    Geocode(GeocodeCompletion),
    Command(Option<Command>),
    Sensing(Option<SensingEvent>),
}

/// Owns the acquirer and serializes all inbound events onto one task.
pub struct SessionPump {
    acquirer: FixAcquirer,
    sensing: Arc<dyn SensingBackend>,
    geocoder: Arc<dyn Geocoder>,
    delegate: Arc<dyn FixDelegate>,
    commands: Receiver<Command>,
    events: Receiver<SensingEvent>,
}

impl fmt::Debug for SessionPump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPump")
            .field("acquirer", &self.acquirer)
            .finish_non_exhaustive()
    }
}

impl SessionPump {
    /// Run until shutdown.
    pub async fn run(mut self) {
        let mut deadline: Fuse<Delay> = Fuse::terminated();
        let mut deadline_session: Option<SessionId> = None;
        let mut geocode: GeocodeFuture = Fuse::terminated();

        // `async_channel::Receiver` is `!Unpin`, so it must be pinned before it
        // can be polled as a `Stream`. Pin handles that share the same channels.
        let mut commands = std::pin::pin!(self.commands.clone());
        let mut events = std::pin::pin!(self.events.clone());

        loop {
            let step = futures::select_biased! {
                () = deadline => Step::Deadline,
                completion = geocode => Step::Geocode(completion),
                command = commands.next().fuse() => Step::Command(command),
                event = events.next().fuse() => Step::Sensing(event),
            };

            match step {
                Step::Deadline => {
                    if let Some(session) = deadline_session.take() {
                        let was = self.acquirer.is_acquiring();
                        let directives = self.acquirer.on_timeout(session);
                        self.apply(directives, &mut deadline, &mut deadline_session, &mut geocode);
                        self.emit_transitions(was);
                    }
                }
                Step::Geocode(completion) => {
                    let was = self.acquirer.is_acquiring();
                    let directives = self.acquirer.on_geocode_result(completion);
                    self.apply(directives, &mut deadline, &mut deadline_session, &mut geocode);
                    self.emit_transitions(was);
                }
                Step::Command(Some(Command::Start)) => {
                    self.handle_start(&mut deadline, &mut deadline_session, &mut geocode);
                }
                Step::Command(Some(Command::Stop)) => {
                    let was = self.acquirer.is_acquiring();
                    let directives = self.acquirer.stop();
                    self.apply(directives, &mut deadline, &mut deadline_session, &mut geocode);
                    self.emit_transitions(was);
                }
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => break,
                Step::Sensing(Some(SensingEvent::Reading(reading))) => {
                    let was = self.acquirer.is_acquiring();
                    let directives = self.acquirer.on_reading(reading);
                    self.apply(directives, &mut deadline, &mut deadline_session, &mut geocode);
                    self.emit_transitions(was);
                }
                Step::Sensing(Some(SensingEvent::Failure(error))) => {
                    let was = self.acquirer.is_acquiring();
                    let directives = self.acquirer.on_sensing_failure(error);
                    self.apply(directives, &mut deadline, &mut deadline_session, &mut geocode);
                    self.emit_transitions(was);
                }
                Step::Sensing(None) => {
                    warn!("sensing event channel closed; shutting pump down");
                    break;
                }
            }
        }

        let _ = self.acquirer.stop();
    }

    fn handle_start(
        &mut self,
        deadline: &mut Fuse<Delay>,
        deadline_session: &mut Option<SessionId>,
        geocode: &mut GeocodeFuture,
    ) {
        match self.sensing.authorization() {
            PermissionStatus::NotDetermined => {
                debug!("authorization not determined; deferring start");
                self.delegate.on_event(FixEvent::AuthorizationRequired);
                return;
            }
            PermissionStatus::Denied | PermissionStatus::Restricted => {
                debug!("authorization denied; refusing start");
                self.delegate.on_event(FixEvent::AuthorizationDenied);
                return;
            }
            PermissionStatus::Granted => {}
        }

        match self.acquirer.start() {
            Ok(directives) => {
                self.apply(directives, deadline, deadline_session, geocode);
                self.delegate
                    .on_event(FixEvent::StatusChanged(self.acquirer.snapshot()));
            }
            Err(err) => warn!("{err}"),
        }
    }

    fn apply(
        &self,
        directives: Vec<Directive>,
        deadline: &mut Fuse<Delay>,
        deadline_session: &mut Option<SessionId>,
        geocode: &mut GeocodeFuture,
    ) {
        for directive in directives {
            match directive {
                Directive::ArmTimeout { session, after } => {
                    *deadline = Delay::new(after).fuse();
                    *deadline_session = Some(session);
                }
                Directive::DisarmTimeout { session } => {
                    if *deadline_session == Some(session) {
                        *deadline = Fuse::terminated();
                        *deadline_session = None;
                    }
                }
                Directive::BeginGeocode(request) => {
                    // Drop any superseded future before issuing the next
                    // request; cancellation must precede the replacement.
                    *geocode = Fuse::terminated();
                    let lookup = self.geocoder.reverse_geocode(request.coordinate);
                    *geocode = async move {
                        GeocodeCompletion {
                            session: request.session,
                            ticket: request.ticket,
                            result: lookup.await,
                        }
                    }
                    .boxed()
                    .fuse();
                }
                Directive::NotifyFirstAddress => {
                    self.delegate.on_event(FixEvent::FirstAddressResolved);
                }
            }
        }
    }

    fn emit_transitions(&self, was_acquiring: bool) {
        if was_acquiring && !self.acquirer.is_acquiring() {
            if let Some(reason) = self.acquirer.stop_reason() {
                self.delegate.on_event(FixEvent::Stopped(reason));
            }
        }
        self.delegate
            .on_event(FixEvent::StatusChanged(self.acquirer.snapshot()));
    }
}
