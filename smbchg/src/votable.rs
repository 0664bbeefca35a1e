//! A votable arbiter for contended charger controls.
//!
//! Several independent subsystems want to set the same hardware control, e.g.
//! the input current limit. Each one casts a vote, and the votable resolves
//! the winner according to its policy. The apply callback pushes the winning
//! value to hardware, once per change of the effective value.
use heapless::Vec;

/// The maximum number of distinct voters a votable can hold.
pub const MAX_VOTERS: usize = 16;

/// The subsystems that cast votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Voter {
    /// Userspace or host override.
    User,
    /// Battery profile defaults.
    BattProfile,
    /// The USB stack, after device enumeration.
    UsbPsy,
    /// BC1.2 detection result for a DCP class charger.
    Dcp,
    /// The PD policy engine.
    Pd,
    /// Software QC3.0 current ramp.
    SwQc3,
    /// QC2.0 input current cap after a forced voltage change.
    Hvdcp2Icl,
    /// Cable legacy status not yet known.
    LegacyUnknown,
    /// We are the source; input path unused.
    Otg,
    /// Weak charger storm mitigation.
    WeakCharger,
    /// Reverse boost storm mitigation.
    BoostBack,
    /// Thermal mitigation daemon.
    ThermalDaemon,
    /// JEITA soft limit compensation.
    Jeita,
    /// Fast-charge ramp floor while no input is attached.
    FccStepper,
    /// Indirection from the PD-disallowed votable.
    PdDisallowedIndirect,
    /// No Type-C partner attached.
    CcDetached,
    /// QC detection has not timed out yet.
    HvdcpTimeout,
    /// Vbus/CC short protection.
    VbusCcShort,
    /// PD hard reset in progress.
    PdHardReset,
    /// Parallel charging settle delay.
    PlDelay,
}

/// How a votable resolves its winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Policy {
    /// The smallest active vote wins.
    Min,
    /// The largest active vote wins.
    Max,
    /// Effective if at least one vote is active; values are ignored.
    SetAny,
}

/// The apply callback. Receives the previous and the new effective value.
pub type ApplyFn<C, E> = fn(&mut C, Option<i32>, Option<i32>) -> Result<(), E>;

/// Voting error.
#[non_exhaustive]
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error<E> {
    /// More distinct voters than the table can hold.
    #[error("vote table is full")]
    TableFull,

    /// The vote value is outside the votable's configured range.
    #[error("vote value out of range")]
    OutOfRange,

    /// The apply callback failed. The vote is recorded regardless.
    #[error("apply callback failed")]
    Apply(E),
}

#[derive(Debug, Clone, Copy)]
struct Vote {
    voter: Voter,
    active: bool,
    value: i32,
}

/// A single votable control.
///
/// `C` is the context handed to the apply callback, `E` its error type.
pub struct Votable<C, E, const N: usize = MAX_VOTERS> {
    name: &'static str,
    policy: Policy,
    votes: Vec<Vote, N>,
    effective: Option<i32>,
    range: Option<(i32, i32)>,
    apply: ApplyFn<C, E>,
}

impl<C, E, const N: usize> Votable<C, E, N> {
    /// Create a votable with the given resolution policy and apply callback.
    pub fn new(name: &'static str, policy: Policy, apply: ApplyFn<C, E>) -> Self {
        // A set-any votable is "none active" from the start, so that the
        // first inactive vote does not look like a change.
        let effective = match policy {
            Policy::SetAny => Some(0),
            Policy::Min | Policy::Max => None,
        };

        Self {
            name,
            policy,
            votes: Vec::new(),
            effective,
            range: None,
            apply,
        }
    }

    /// Restrict the accepted vote values to `min..=max`.
    pub fn with_range(mut self, min: i32, max: i32) -> Self {
        self.range = Some((min, max));
        self
    }

    /// The votable's name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cast, update or withdraw a vote.
    ///
    /// An inactive vote withdraws the voter from resolution but keeps its
    /// last value readable. The apply callback runs only when the effective
    /// value changes; the vote is recorded even if the callback fails.
    pub fn vote(&mut self, context: &mut C, voter: Voter, active: bool, value: i32) -> Result<(), Error<E>> {
        if active && let Some((min, max)) = self.range {
            if value < min || value > max {
                return Err(Error::OutOfRange);
            }
        }

        match self.votes.iter_mut().find(|vote| vote.voter == voter) {
            Some(vote) => {
                if vote.active == active && (!active || vote.value == value) {
                    return Ok(());
                }
                vote.active = active;
                // A withdrawal keeps the last submitted value readable.
                if active {
                    vote.value = value;
                }
            }
            None => self
                .votes
                .push(Vote { voter, active, value })
                .map_err(|_| Error::TableFull)?,
        }

        let new = self.resolve();
        if new != self.effective {
            let old = self.effective;
            self.effective = new;
            trace!("votable {}: {:?} -> {:?} (voter {:?})", self.name, old, new, voter);
            (self.apply)(context, old, new).map_err(Error::Apply)?;
        }

        Ok(())
    }

    /// Re-run the apply callback with the current effective value.
    pub fn rerun(&mut self, context: &mut C) -> Result<(), E> {
        (self.apply)(context, self.effective, self.effective)
    }

    fn resolve(&self) -> Option<i32> {
        let mut active = self.votes.iter().filter(|vote| vote.active).map(|vote| vote.value);

        match self.policy {
            Policy::Min => active.min(),
            Policy::Max => active.max(),
            Policy::SetAny => Some(i32::from(active.next().is_some())),
        }
    }

    /// The current effective value, or `None` if no vote is active.
    pub fn effective(&self) -> Option<i32> {
        self.effective
    }

    /// Whether the effective value is present and non-zero.
    pub fn is_enabled(&self) -> bool {
        matches!(self.effective, Some(value) if value != 0)
    }

    /// The last value a voter submitted, whether or not its vote is active.
    pub fn client_vote(&self, voter: Voter) -> Option<i32> {
        self.votes
            .iter()
            .find(|vote| vote.voter == voter)
            .map(|vote| vote.value)
    }

    /// Whether a specific voter currently has an active vote.
    pub fn is_client_enabled(&self, voter: Voter) -> bool {
        self.votes.iter().any(|vote| vote.voter == voter && vote.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = std::vec::Vec<(Option<i32>, Option<i32>)>;

    fn record(log: &mut Log, old: Option<i32>, new: Option<i32>) -> Result<(), ()> {
        log.push((old, new));
        Ok(())
    }

    fn failing(_log: &mut Log, _old: Option<i32>, _new: Option<i32>) -> Result<(), ()> {
        Err(())
    }

    #[test]
    fn min_votable_is_order_independent() {
        let mut log_a = Log::new();
        let mut a: Votable<Log, ()> = Votable::new("a", Policy::Min, record);
        a.vote(&mut log_a, Voter::UsbPsy, true, 500_000).unwrap();
        a.vote(&mut log_a, Voter::ThermalDaemon, true, 300_000).unwrap();
        a.vote(&mut log_a, Voter::Dcp, true, 1_500_000).unwrap();

        let mut log_b = Log::new();
        let mut b: Votable<Log, ()> = Votable::new("b", Policy::Min, record);
        b.vote(&mut log_b, Voter::Dcp, true, 1_500_000).unwrap();
        b.vote(&mut log_b, Voter::ThermalDaemon, true, 300_000).unwrap();
        b.vote(&mut log_b, Voter::UsbPsy, true, 500_000).unwrap();

        assert_eq!(a.effective(), Some(300_000));
        assert_eq!(b.effective(), Some(300_000));
    }

    #[test]
    fn callback_runs_once_per_effective_change() {
        let mut log = Log::new();
        let mut icl: Votable<Log, ()> = Votable::new("usb_icl", Policy::Min, record);

        icl.vote(&mut log, Voter::UsbPsy, true, 500_000).unwrap();
        assert_eq!(log, &[(None, Some(500_000))]);

        icl.vote(&mut log, Voter::ThermalDaemon, true, 300_000).unwrap();
        assert_eq!(log.last(), Some(&(Some(500_000), Some(300_000))));

        // A losing vote does not change the effective value.
        icl.vote(&mut log, Voter::Dcp, true, 1_500_000).unwrap();
        assert_eq!(log.len(), 2);

        // Re-casting an identical vote is a no-op.
        icl.vote(&mut log, Voter::ThermalDaemon, true, 300_000).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn withdrawing_the_winner_promotes_the_next_best() {
        let mut log = Log::new();
        let mut icl: Votable<Log, ()> = Votable::new("usb_icl", Policy::Min, record);

        icl.vote(&mut log, Voter::UsbPsy, true, 500_000).unwrap();
        icl.vote(&mut log, Voter::ThermalDaemon, true, 300_000).unwrap();
        assert_eq!(icl.effective(), Some(300_000));

        icl.vote(&mut log, Voter::ThermalDaemon, false, 0).unwrap();
        assert_eq!(icl.effective(), Some(500_000));

        // Withdrawn voters keep no active vote, but their last submitted
        // value stays readable.
        assert!(!icl.is_client_enabled(Voter::ThermalDaemon));
        assert_eq!(icl.client_vote(Voter::ThermalDaemon), Some(300_000));
        assert_eq!(icl.client_vote(Voter::UsbPsy), Some(500_000));

        icl.vote(&mut log, Voter::UsbPsy, false, 0).unwrap();
        assert_eq!(icl.effective(), None);
    }

    #[test]
    fn set_any_is_a_logical_or() {
        let mut log = Log::new();
        let mut disable: Votable<Log, ()> = Votable::new("apsd_disable", Policy::SetAny, record);

        assert!(!disable.is_enabled());

        disable.vote(&mut log, Voter::Pd, true, 0).unwrap();
        disable.vote(&mut log, Voter::PdHardReset, true, 0).unwrap();
        assert!(disable.is_enabled());

        disable.vote(&mut log, Voter::Pd, false, 0).unwrap();
        assert!(disable.is_enabled());

        disable.vote(&mut log, Voter::PdHardReset, false, 0).unwrap();
        assert!(!disable.is_enabled());

        // Enable, disable, and one spurious disable vote on a fresh votable.
        assert_eq!(log, &[(Some(0), Some(1)), (Some(1), Some(0))]);
    }

    #[test]
    fn max_votable_takes_the_largest_vote() {
        let mut log = Log::new();
        let mut level: Votable<Log, ()> = Votable::new("level", Policy::Max, record);

        level.vote(&mut log, Voter::User, true, 2).unwrap();
        level.vote(&mut log, Voter::ThermalDaemon, true, 5).unwrap();
        assert_eq!(level.effective(), Some(5));

        level.vote(&mut log, Voter::ThermalDaemon, false, 0).unwrap();
        assert_eq!(level.effective(), Some(2));
    }

    #[test]
    fn out_of_range_votes_are_rejected_before_apply() {
        let mut log = Log::new();
        let mut icl: Votable<Log, ()> = Votable::new("usb_icl", Policy::Min, record).with_range(0, 3_300_000);

        assert_eq!(icl.vote(&mut log, Voter::User, true, -1), Err(Error::OutOfRange));
        assert_eq!(icl.vote(&mut log, Voter::User, true, 4_000_000), Err(Error::OutOfRange));
        assert!(log.is_empty());
        assert_eq!(icl.effective(), None);
    }

    #[test]
    fn vote_is_recorded_even_when_apply_fails() {
        let mut log = Log::new();
        let mut icl: Votable<Log, ()> = Votable::new("usb_icl", Policy::Min, failing);

        assert_eq!(icl.vote(&mut log, Voter::UsbPsy, true, 500_000), Err(Error::Apply(())));
        assert_eq!(icl.effective(), Some(500_000));
        assert_eq!(icl.client_vote(Voter::UsbPsy), Some(500_000));
    }
}
