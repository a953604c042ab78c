//! The fix-acquisition state machine.
//!
//! One [`FixAcquirer`] owns one acquisition session at a time: it filters the
//! reading stream for freshness and validity, promotes strictly more accurate
//! fixes, stops when a fix is good enough (or the device clearly is not going
//! to do better), and keeps exactly one reverse-geocode request in flight for
//! the best fix.
//!
//! All operations assume serial delivery on one logical thread; there is no
//! internal locking. Timer and geocode work is asynchronous, so operations
//! describe it as [`Directive`]s for the driver instead of performing it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geotag_geocode::{Coordinate, GeocodeError, Placemark};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{PositionReading, SensingBackend, SensingConfig, SensingError, distance_meters};

/// Tuning knobs for fix acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquirerConfig {
    /// Accuracy radius at which a fix is good enough to stop, in meters.
    pub desired_accuracy: f64,
    /// Readings older than this at delivery time are discarded as cached.
    pub stale_after: Duration,
    /// Readings within this distance of the best fix count as "not moving",
    /// in meters.
    pub convergence_radius: f64,
    /// How long the device may sit still before acquisition stops waiting for
    /// a better fix.
    pub convergence_patience: Duration,
    /// Hard ceiling on a session's lifetime.
    pub session_timeout: Duration,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            desired_accuracy: 10.0,
            stale_after: Duration::from_secs(5),
            convergence_radius: 1.0,
            convergence_patience: Duration::from_secs(10),
            session_timeout: Duration::from_secs(60),
        }
    }
}

/// Identifies one acquisition session.
///
/// Timeout and geocode callbacks carry the session they belong to; callbacks
/// tagged with a superseded session are ignored, which defuses timers and
/// requests that outlive the session that armed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// Identifies one reverse-geocode request within an acquirer.
///
/// The single-flight slot belongs to the newest ticket; completions for older
/// tickets are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeocodeTicket(u32);

/// A reverse-geocode request the driver must issue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeRequest {
    /// Session the request belongs to.
    pub session: SessionId,
    /// Single-flight slot this request occupies.
    pub ticket: GeocodeTicket,
    /// Coordinates to resolve.
    pub coordinate: Coordinate,
}

/// A completed reverse-geocode request.
#[derive(Debug, Clone)]
pub struct GeocodeCompletion {
    /// Session the request belonged to.
    pub session: SessionId,
    /// Ticket the request was issued under.
    pub ticket: GeocodeTicket,
    /// What the geocoding service returned.
    pub result: Result<Vec<Placemark>, GeocodeError>,
}

/// Side effects the caller must carry out after an operation returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Arm the one-shot session deadline.
    ArmTimeout {
        /// Session the deadline belongs to.
        session: SessionId,
        /// Delay until the deadline fires.
        after: Duration,
    },
    /// Disarm the session deadline.
    DisarmTimeout {
        /// Session whose deadline to disarm.
        session: SessionId,
    },
    /// Issue the reverse-geocode request, replacing any outstanding one.
    BeginGeocode(GeocodeRequest),
    /// The session resolved its first address; presentation may chime.
    NotifyFirstAddress,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A fix met the desired accuracy.
    GoalReached,
    /// The device sat still; further readings would not have improved the fix.
    Converged,
    /// The caller stopped the session.
    Cancelled,
    /// A fatal sensing failure.
    Failed,
    /// The deadline elapsed without a usable fix.
    TimedOut,
}

/// Where the session's address lookup currently stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AddressOutcome {
    /// No geocode has completed this session.
    #[default]
    NotRequested,
    /// The service returned no candidates.
    NotFound,
    /// The service failed.
    Failed(GeocodeError),
    /// The best candidate so far.
    Found(Placemark),
}

/// Error returned by [`FixAcquirer::start`] while a session is running.
///
/// Callers with toggle-button semantics should check
/// [`FixAcquirer::is_acquiring`] and stop instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyAcquiring;

impl fmt::Display for AlreadyAcquiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acquisition already in progress")
    }
}

impl std::error::Error for AlreadyAcquiring {}

/// Display-ready projection of the acquirer state.
#[derive(Debug, Clone, PartialEq)]
pub struct FixSnapshot {
    /// Status line ("Searching...", error text, idle prompt).
    pub message: String,
    /// Best coordinates so far.
    pub coordinate: Option<Coordinate>,
    /// Best accuracy radius so far, in meters.
    pub accuracy: Option<f64>,
    /// Address line for display.
    pub address: String,
    /// Whether the fix is good enough to offer tagging.
    pub can_tag: bool,
    /// Whether acquisition is running.
    pub acquiring: bool,
}

/// The fix-acquisition state machine.
pub struct FixAcquirer {
    sensing: Arc<dyn SensingBackend>,
    config: AcquirerConfig,
    session: SessionId,
    acquiring: bool,
    best: Option<PositionReading>,
    last_error: Option<SensingError>,
    geocode_in_flight: bool,
    ticket: GeocodeTicket,
    address: AddressOutcome,
    deadline: Option<Instant>,
    stop_reason: Option<StopReason>,
}

impl fmt::Debug for FixAcquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixAcquirer")
            .field("session", &self.session)
            .field("acquiring", &self.acquiring)
            .field("best", &self.best)
            .field("geocode_in_flight", &self.geocode_in_flight)
            .finish_non_exhaustive()
    }
}

impl FixAcquirer {
    /// Create an idle acquirer over `sensing`.
    #[must_use]
    pub fn new(sensing: Arc<dyn SensingBackend>, config: AcquirerConfig) -> Self {
        Self {
            sensing,
            config,
            session: SessionId(0),
            acquiring: false,
            best: None,
            last_error: None,
            geocode_in_flight: false,
            ticket: GeocodeTicket(0),
            address: AddressOutcome::NotRequested,
            deadline: None,
            stop_reason: None,
        }
    }

    /// Begin a new acquisition session.
    ///
    /// Resets all per-session state, starts backend updates, and asks the
    /// driver to arm the session deadline. If the backend refuses to start,
    /// the refusal is recorded as the session error and no session runs.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyAcquiring`] if a session is running.
    pub fn start(&mut self) -> Result<Vec<Directive>, AlreadyAcquiring> {
        if self.acquiring {
            return Err(AlreadyAcquiring);
        }

        self.session = SessionId(self.session.0 + 1);
        self.best = None;
        self.last_error = None;
        self.geocode_in_flight = false;
        self.address = AddressOutcome::NotRequested;
        self.stop_reason = None;
        self.deadline = None;

        let hint = SensingConfig {
            accuracy_hint: self.config.desired_accuracy,
        };
        if let Err(err) = self.sensing.start_updates(hint) {
            warn!("sensing backend refused to start: {err}");
            self.last_error = Some(err);
            return Ok(Vec::new());
        }

        self.acquiring = true;
        self.deadline = Some(Instant::now() + self.config.session_timeout);
        info!("session {} started", self.session.0);
        Ok(vec![Directive::ArmTimeout {
            session: self.session,
            after: self.config.session_timeout,
        }])
    }

    /// Stop the running session, keeping the best fix and address visible.
    ///
    /// No-op when idle.
    pub fn stop(&mut self) -> Vec<Directive> {
        self.halt(StopReason::Cancelled)
    }

    fn halt(&mut self, reason: StopReason) -> Vec<Directive> {
        if !self.acquiring {
            return Vec::new();
        }
        self.sensing.stop_updates();
        self.acquiring = false;
        self.deadline = None;
        self.stop_reason = Some(reason);
        info!("session {} stopped: {reason:?}", self.session.0);
        vec![Directive::DisarmTimeout {
            session: self.session,
        }]
    }

    /// Feed one position reading from the sensing backend.
    pub fn on_reading(&mut self, reading: PositionReading) -> Vec<Directive> {
        if !self.acquiring {
            debug!("ignoring reading delivered while idle");
            return Vec::new();
        }
        if reading.timestamp.elapsed() > self.config.stale_after {
            debug!("ignoring stale reading");
            return Vec::new();
        }
        if reading.horizontal_accuracy < 0.0 {
            debug!("ignoring reading with invalid accuracy");
            return Vec::new();
        }

        let previous = self.best;
        let distance = previous.map(|best| distance_meters(best.coordinate, reading.coordinate));

        let improves = previous
            .is_none_or(|best| reading.horizontal_accuracy < best.horizontal_accuracy);
        if improves {
            self.last_error = None;
            self.best = Some(reading);
            debug!(
                "promoted reading ±{:.1}m at {}",
                reading.horizontal_accuracy, reading.coordinate
            );

            let mut directives = Vec::new();
            if reading.horizontal_accuracy <= self.config.desired_accuracy {
                // Final fix. If the device moved since the in-flight geocode
                // was issued, abandon it so the final coordinates resolve.
                if self.geocode_in_flight && distance.is_some_and(|d| d > 0.0) {
                    self.abandon_geocode();
                }
                info!("desired accuracy reached");
                directives.extend(self.halt(StopReason::GoalReached));
            }
            if !self.geocode_in_flight {
                directives.push(self.begin_geocode(reading.coordinate));
            }
            return directives;
        }

        // Not an improvement. If the device has sat within the convergence
        // radius of the best fix for longer than the patience window, a
        // better fix is not coming.
        if let (Some(best), Some(distance)) = (previous, distance) {
            if distance < self.config.convergence_radius {
                let since_best = reading.timestamp.saturating_duration_since(best.timestamp);
                if since_best > self.config.convergence_patience {
                    info!("position converged; stopping");
                    return self.halt(StopReason::Converged);
                }
            }
        }
        Vec::new()
    }

    fn begin_geocode(&mut self, coordinate: Coordinate) -> Directive {
        self.ticket = GeocodeTicket(self.ticket.0 + 1);
        self.geocode_in_flight = true;
        debug!("requesting reverse geocode for {coordinate}");
        Directive::BeginGeocode(GeocodeRequest {
            session: self.session,
            ticket: self.ticket,
            coordinate,
        })
    }

    fn abandon_geocode(&mut self) {
        debug!("abandoning in-flight geocode");
        self.geocode_in_flight = false;
        self.ticket = GeocodeTicket(self.ticket.0 + 1);
    }

    /// Feed one failure from the sensing backend.
    ///
    /// Transient "position unknown" failures are ignored; the backend keeps
    /// trying. Anything else ends the session.
    pub fn on_sensing_failure(&mut self, error: SensingError) -> Vec<Directive> {
        if !error.is_fatal() {
            debug!("transient sensing failure: {error}");
            return Vec::new();
        }
        warn!("sensing failed: {error}");
        self.last_error = Some(error);
        self.halt(StopReason::Failed)
    }

    /// The session deadline fired.
    ///
    /// Only the current session's deadline counts; with a usable fix already
    /// in hand (or no session running) a late fire is a no-op.
    pub fn on_timeout(&mut self, session: SessionId) -> Vec<Directive> {
        if session != self.session {
            warn!("ignoring deadline from superseded session {}", session.0);
            return Vec::new();
        }
        if !self.acquiring || self.best.is_some() {
            return Vec::new();
        }
        info!("session {} timed out with no usable fix", session.0);
        let directives = self.halt(StopReason::TimedOut);
        self.last_error = Some(SensingError::Timeout);
        directives
    }

    /// Feed the completion of a reverse-geocode request.
    pub fn on_geocode_result(&mut self, completion: GeocodeCompletion) -> Vec<Directive> {
        if completion.session != self.session {
            warn!("ignoring geocode completion from superseded session");
            return Vec::new();
        }
        if completion.ticket != self.ticket {
            debug!("ignoring completion for abandoned geocode request");
            return Vec::new();
        }

        self.geocode_in_flight = false;
        match completion.result {
            Ok(mut candidates) => {
                if let Some(best) = candidates.pop() {
                    debug!("resolved address ({} candidate(s) total)", candidates.len() + 1);
                    let first = !matches!(self.address, AddressOutcome::Found(_));
                    self.address = AddressOutcome::Found(best);
                    if first {
                        return vec![Directive::NotifyFirstAddress];
                    }
                } else {
                    self.address = AddressOutcome::NotFound;
                }
            }
            Err(err) => {
                warn!("reverse geocode failed: {err}");
                self.address = AddressOutcome::Failed(err);
            }
        }
        Vec::new()
    }

    /// Whether a session is running.
    #[must_use]
    pub const fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    /// The current session.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// The most accurate reading seen this session.
    #[must_use]
    pub const fn best_reading(&self) -> Option<PositionReading> {
        self.best
    }

    /// The most recent fatal sensing failure, if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&SensingError> {
        self.last_error.as_ref()
    }

    /// Where the address lookup stands.
    #[must_use]
    pub const fn address(&self) -> &AddressOutcome {
        &self.address
    }

    /// Whether a reverse-geocode request is outstanding.
    #[must_use]
    pub const fn geocode_in_flight(&self) -> bool {
        self.geocode_in_flight
    }

    /// When the running session gives up, if one is running.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the last session ended.
    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Status line for the capture screen.
    #[must_use]
    pub fn status_message(&self) -> &'static str {
        match &self.last_error {
            Some(SensingError::PermissionDenied | SensingError::ServicesDisabled) => {
                "Location Services Disabled"
            }
            Some(_) => "Error in Getting Location",
            None if !self.sensing.services_enabled() => "Location Services Disabled",
            None if self.acquiring => "Searching...",
            None => "Tap to Start",
        }
    }

    /// Address line for the capture screen.
    #[must_use]
    pub fn address_line(&self) -> String {
        if let AddressOutcome::Found(placemark) = &self.address {
            return placemark.address_lines();
        }
        if self.geocode_in_flight {
            return "Searching for Address...".into();
        }
        match self.address {
            AddressOutcome::Failed(_) => "Error Finding Address".into(),
            _ => "No Address Found".into(),
        }
    }

    /// Display-ready projection of the current state.
    #[must_use]
    pub fn snapshot(&self) -> FixSnapshot {
        FixSnapshot {
            message: self.status_message().into(),
            coordinate: self.best.map(|reading| reading.coordinate),
            accuracy: self.best.map(|reading| reading.horizontal_accuracy),
            address: self.address_line(),
            can_tag: self.best.is_some(),
            acquiring: self.acquiring,
        }
    }
}
