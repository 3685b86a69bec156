use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tangle_protocol::{
    CodecError, DeserializationMode, Milestone, MilestoneIndex, ProtocolParameters,
    ProtocolParamsMilestoneOpt, Versions,
};
use tracing::{debug, info};

use super::{EventSink, ParamsStore, ProtocolEvent};
use crate::data::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("no protocol parameters stored for ledger index {ledger_index}")]
    ParametersNotFound { ledger_index: MilestoneIndex },

    #[error("failed to load protocol parameters: {0}")]
    LoadStore(#[source] StoreError),

    #[error("failed to deserialize protocol parameters: {0}")]
    LoadDeserialize(#[source] CodecError),

    #[error("unable to persist new protocol parameters: {0}")]
    Persistence(#[source] StoreError),

    #[error("unable to deserialize new protocol parameters for milestone {target}: {source}")]
    Activation {
        target: MilestoneIndex,
        #[source]
        source: CodecError,
    },
}

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Knows the current, pending and supported protocol parameters.
///
/// Readers may call the accessors from any thread. Milestones must be fed
/// through [`Manager::handle_confirmed_milestone`] by a single writer in
/// increasing index order.
///
/// `current` and `pending` have separate locks. A path that needs both takes
/// `current` first, then `pending`; only `update_current` does so.
pub struct Manager<S> {
    store: Arc<S>,
    sink: Arc<dyn EventSink>,
    supported: Versions,
    current: RwLock<Arc<ProtocolParameters>>,
    pending: RwLock<VecDeque<ProtocolParamsMilestoneOpt>>,
}

impl<S: ParamsStore> Manager<S> {
    /// Loads the parameters effective at `ledger_index` and every stored
    /// change that targets a later milestone.
    pub fn new(store: Arc<S>, ledger_index: MilestoneIndex, sink: Arc<dyn EventSink>) -> Result<Self> {
        Self::with_supported_versions(store, ledger_index, Versions::supported(), sink)
    }

    pub fn with_supported_versions(
        store: Arc<S>,
        ledger_index: MilestoneIndex,
        supported: Versions,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let current = load_current(store.as_ref(), ledger_index)?;
        let pending = load_pending(store.as_ref(), ledger_index)?;

        info!(
            ledger_index,
            version = current.version,
            network = %current.network_name,
            pending = pending.len(),
            supported = %supported,
            "Protocol parameters loaded"
        );

        Ok(Self {
            store,
            sink,
            supported,
            current: RwLock::new(Arc::new(current)),
            pending: RwLock::new(pending),
        })
    }

    /// The parameters the node is operating under.
    pub fn current(&self) -> Arc<ProtocolParameters> {
        Arc::clone(&self.read_current())
    }

    /// Snapshot of the announced changes that have not taken effect yet.
    pub fn pending(&self) -> Vec<ProtocolParamsMilestoneOpt> {
        self.read_pending().iter().cloned().collect()
    }

    pub fn supported_versions(&self) -> &Versions {
        &self.supported
    }

    /// Whether the next pending change, if any, runs a supported version.
    pub fn next_pending_supported(&self) -> bool {
        match self.read_pending().front() {
            Some(next) => self.supported.supports(next.protocol_version),
            None => true,
        }
    }

    /// Examines a newly confirmed milestone for parameter changes and applies
    /// the next pending change once it is due.
    ///
    /// Failures are reported through the event sink, never returned.
    pub fn handle_confirmed_milestone(&self, milestone: &Milestone) {
        if let Some(announcement) = milestone.protocol_params() {
            if let Err(e) = self.record_announcement(milestone.index, announcement) {
                self.sink.emit(ProtocolEvent::CriticalError(e));
                return;
            }
        }

        if !self.current_should_change(milestone.index) {
            return;
        }

        if let Err(e) = self.update_current() {
            self.sink.emit(ProtocolEvent::CriticalError(e));
        }
    }

    /// Persists the announcement, then queues it. Nothing is queued when the
    /// store write fails.
    fn record_announcement(
        &self,
        index: MilestoneIndex,
        announcement: &ProtocolParamsMilestoneOpt,
    ) -> Result<()> {
        if self.read_pending().contains(announcement) {
            debug!(
                milestone = index,
                target = announcement.target_milestone_index,
                "Protocol parameters change already pending"
            );
            return Ok(());
        }

        self.store
            .append_change(announcement)
            .map_err(ManagerError::Persistence)?;

        self.write_pending().push_back(announcement.clone());

        info!(
            milestone = index,
            target = announcement.target_milestone_index,
            version = announcement.protocol_version,
            supported = self.supported.supports(announcement.protocol_version),
            "Protocol parameters change announced"
        );
        Ok(())
    }

    fn current_should_change(&self, index: MilestoneIndex) -> bool {
        let next = match self.read_pending().front() {
            Some(next) => next.clone(),
            None => return false,
        };

        let target = next.target_milestone_index;
        if target <= index {
            return true;
        }

        // target > index, so target - 1 cannot underflow
        if target - 1 == index && !self.supported.supports(next.protocol_version) {
            self.sink.emit(ProtocolEvent::NextMilestoneUnsupported(next));
        }
        false
    }

    fn update_current(&self) -> Result<()> {
        let Some(next) = self.read_pending().front().cloned() else {
            return Ok(());
        };

        let params = decode_announced(&next)?;

        let mut current = self.write_current();
        let mut pending = self.write_pending();
        debug_assert_eq!(pending.front(), Some(&next));
        pending.pop_front();
        *current = Arc::new(params);

        info!(
            target = next.target_milestone_index,
            version = current.version,
            network = %current.network_name,
            pending = pending.len(),
            "Protocol parameters activated"
        );
        Ok(())
    }

    fn read_current(&self) -> RwLockReadGuard<'_, Arc<ProtocolParameters>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_current(&self) -> RwLockWriteGuard<'_, Arc<ProtocolParameters>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_pending(&self) -> RwLockReadGuard<'_, VecDeque<ProtocolParamsMilestoneOpt>> {
        self.pending.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_pending(&self) -> RwLockWriteGuard<'_, VecDeque<ProtocolParamsMilestoneOpt>> {
        self.pending.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_current<S: ParamsStore + ?Sized>(
    store: &S,
    ledger_index: MilestoneIndex,
) -> Result<ProtocolParameters> {
    let bytes = store
        .load_effective_parameters(ledger_index)
        .map_err(ManagerError::LoadStore)?
        .ok_or(ManagerError::ParametersNotFound { ledger_index })?;

    // already accepted once, so do not re-validate
    ProtocolParameters::from_bytes(&bytes, DeserializationMode::NoValidation)
        .map_err(ManagerError::LoadDeserialize)
}

fn load_pending<S: ParamsStore + ?Sized>(
    store: &S,
    ledger_index: MilestoneIndex,
) -> Result<VecDeque<ProtocolParamsMilestoneOpt>> {
    let mut pending = VecDeque::new();
    store
        .for_each_change(&mut |change| {
            if change.target_milestone_index > ledger_index {
                pending.push_back(change);
            }
            ControlFlow::Continue(())
        })
        .map_err(ManagerError::LoadStore)?;
    Ok(pending)
}

fn decode_announced(next: &ProtocolParamsMilestoneOpt) -> Result<ProtocolParameters> {
    let activation_error = |source| ManagerError::Activation {
        target: next.target_milestone_index,
        source,
    };

    let params = ProtocolParameters::from_bytes(&next.params, DeserializationMode::PerformValidation)
        .map_err(activation_error)?;

    if params.version != next.protocol_version {
        return Err(activation_error(CodecError::Invalid {
            field: "version",
            reason: format!(
                "announced as v{} but encodes v{}",
                next.protocol_version, params.version
            ),
        }));
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::NodeStore;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ProtocolEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: ProtocolEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl RecordingSink {
        fn unsupported(&self) -> Vec<ProtocolParamsMilestoneOpt> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ProtocolEvent::NextMilestoneUnsupported(change) => Some(change.clone()),
                    _ => None,
                })
                .collect()
        }

        fn critical_count(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, ProtocolEvent::CriticalError(_)))
                .count()
        }

        fn len(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    /// Store whose appends always fail.
    struct ReadOnlyStore(NodeStore);

    impl ParamsStore for ReadOnlyStore {
        fn load_effective_parameters(
            &self,
            ledger_index: MilestoneIndex,
        ) -> crate::data::node_store::Result<Option<Vec<u8>>> {
            self.0.load_effective_parameters(ledger_index)
        }

        fn append_change(
            &self,
            _change: &ProtocolParamsMilestoneOpt,
        ) -> crate::data::node_store::Result<()> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn for_each_change(
            &self,
            visitor: &mut dyn FnMut(ProtocolParamsMilestoneOpt) -> ControlFlow<()>,
        ) -> crate::data::node_store::Result<()> {
            self.0.for_each_change(visitor)
        }
    }

    fn params_v(version: u8) -> ProtocolParameters {
        ProtocolParameters {
            version,
            ..ProtocolParameters::default()
        }
    }

    fn change(target: MilestoneIndex, version: u8) -> ProtocolParamsMilestoneOpt {
        ProtocolParamsMilestoneOpt::new(target, &params_v(version)).unwrap()
    }

    fn milestone(index: MilestoneIndex) -> Milestone {
        Milestone::new(index, 1_700_000_000 + index)
    }

    /// v2 effective at 100 with `pending` already stored.
    fn setup(
        pending: &[ProtocolParamsMilestoneOpt],
        supported: Versions,
    ) -> (Manager<NodeStore>, Arc<RecordingSink>) {
        let store = NodeStore::open_in_memory().unwrap();
        store.append_change(&change(100, 2)).unwrap();
        for c in pending {
            store.append_change(c).unwrap();
        }

        let sink = Arc::new(RecordingSink::default());
        let manager =
            Manager::with_supported_versions(Arc::new(store), 100, supported, sink.clone())
                .unwrap();
        (manager, sink)
    }

    #[test]
    fn test_init_loads_effective_and_later_changes() {
        let store = NodeStore::open_in_memory().unwrap();
        store.append_change(&change(0, 1)).unwrap();
        store.append_change(&change(100, 2)).unwrap();
        store.append_change(&change(105, 3)).unwrap();
        store.append_change(&change(120, 4)).unwrap();

        let sink = Arc::new(RecordingSink::default());
        let manager = Manager::new(Arc::new(store), 100, sink.clone()).unwrap();

        assert_eq!(*manager.current(), params_v(2));
        assert_eq!(manager.pending(), vec![change(105, 3), change(120, 4)]);
        assert_eq!(sink.len(), 0);
    }

    #[test]
    fn test_init_at_earlier_index_keeps_more_pending() {
        let store = NodeStore::open_in_memory().unwrap();
        store.append_change(&change(0, 1)).unwrap();
        store.append_change(&change(100, 2)).unwrap();
        store.append_change(&change(105, 3)).unwrap();

        let manager = Manager::new(Arc::new(store), 99, Arc::new(RecordingSink::default())).unwrap();

        assert_eq!(manager.current().version, 1);
        assert_eq!(manager.pending(), vec![change(100, 2), change(105, 3)]);
    }

    #[test]
    fn test_init_without_parameters_fails() {
        let store = NodeStore::open_in_memory().unwrap();
        store.append_change(&change(200, 2)).unwrap();

        let result = Manager::new(Arc::new(store), 100, Arc::new(RecordingSink::default()));
        assert!(matches!(
            result,
            Err(ManagerError::ParametersNotFound { ledger_index: 100 })
        ));
    }

    #[test]
    fn test_init_with_truncated_parameters_fails() {
        let store = NodeStore::open_in_memory().unwrap();
        let mut broken = change(0, 2);
        broken.params.truncate(4);
        store.append_change(&broken).unwrap();

        let result = Manager::new(Arc::new(store), 10, Arc::new(RecordingSink::default()));
        assert!(matches!(result, Err(ManagerError::LoadDeserialize(_))));
    }

    #[test]
    fn test_init_does_not_revalidate_stored_parameters() {
        let store = NodeStore::open_in_memory().unwrap();
        let lenient = ProtocolParameters {
            token_supply: 0,
            ..params_v(2)
        };
        store
            .append_change(&ProtocolParamsMilestoneOpt::new(0, &lenient).unwrap())
            .unwrap();

        let manager = Manager::new(Arc::new(store), 10, Arc::new(RecordingSink::default())).unwrap();
        assert_eq!(*manager.current(), lenient);
    }

    #[test]
    fn test_unsupported_next_milestone_warns_once_without_activating() {
        let (manager, sink) = setup(&[change(105, 3)], Versions::new([2]));

        manager.handle_confirmed_milestone(&milestone(104));

        assert_eq!(sink.unsupported(), vec![change(105, 3)]);
        assert_eq!(sink.len(), 1);
        assert_eq!(manager.current().version, 2);
        assert_eq!(manager.pending().len(), 1);
        assert!(!manager.next_pending_supported());
    }

    #[test]
    fn test_due_change_activates_and_pops() {
        let (manager, sink) = setup(&[change(105, 3), change(110, 4)], Versions::range(2..=4));

        manager.handle_confirmed_milestone(&milestone(105));

        assert_eq!(*manager.current(), params_v(3));
        assert_eq!(manager.pending(), vec![change(110, 4)]);
        assert_eq!(sink.len(), 0);
    }

    #[test]
    fn test_overdue_change_activates() {
        let (manager, _sink) = setup(&[change(103, 3)], Versions::range(2..=3));

        manager.handle_confirmed_milestone(&milestone(107));

        assert_eq!(manager.current().version, 3);
        assert!(manager.pending().is_empty());
    }

    #[test]
    fn test_distant_change_leaves_state_unchanged() {
        let (manager, sink) = setup(&[change(110, 3)], Versions::new([2]));

        manager.handle_confirmed_milestone(&milestone(101));

        assert_eq!(manager.current().version, 2);
        assert_eq!(manager.pending(), vec![change(110, 3)]);
        assert_eq!(sink.len(), 0);
    }

    #[test]
    fn test_scenario_supported_upgrade() {
        let (manager, sink) = setup(&[change(105, 3)], Versions::range(2..=3));

        for index in 101..=104 {
            manager.handle_confirmed_milestone(&milestone(index));
            assert_eq!(manager.current().version, 2, "milestone {index}");
        }
        assert_eq!(sink.len(), 0);
        assert!(manager.next_pending_supported());

        manager.handle_confirmed_milestone(&milestone(105));
        assert_eq!(manager.current().version, 3);
        assert!(manager.pending().is_empty());
        assert_eq!(sink.len(), 0);
    }

    #[test]
    fn test_scenario_unsupported_upgrade_still_activates() {
        let (manager, sink) = setup(&[change(105, 3)], Versions::new([2]));

        for index in 101..=103 {
            manager.handle_confirmed_milestone(&milestone(index));
        }
        assert_eq!(sink.len(), 0);

        manager.handle_confirmed_milestone(&milestone(104));
        assert_eq!(sink.unsupported(), vec![change(105, 3)]);
        assert_eq!(manager.current().version, 2);

        manager.handle_confirmed_milestone(&milestone(105));
        assert_eq!(manager.current().version, 3);
        assert!(manager.pending().is_empty());
        assert!(manager.next_pending_supported());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_announcement_is_persisted_and_queued() {
        let (manager, sink) = setup(&[], Versions::range(2..=3));

        manager.handle_confirmed_milestone(&milestone(101).with_protocol_params(change(110, 3)));

        assert_eq!(manager.pending(), vec![change(110, 3)]);
        assert_eq!(sink.len(), 0);

        // a fresh manager recovers the announcement from the store
        let recovered =
            Manager::new(Arc::clone(&manager.store), 101, Arc::new(RecordingSink::default()))
                .unwrap();
        assert_eq!(recovered.pending(), vec![change(110, 3)]);
    }

    #[test]
    fn test_announcement_for_current_milestone_activates_immediately() {
        let (manager, _sink) = setup(&[], Versions::range(2..=3));

        manager.handle_confirmed_milestone(&milestone(101).with_protocol_params(change(101, 3)));

        assert_eq!(manager.current().version, 3);
        assert!(manager.pending().is_empty());
    }

    #[test]
    fn test_announcement_for_next_milestone_warns_immediately() {
        let (manager, sink) = setup(&[], Versions::new([2]));

        manager.handle_confirmed_milestone(&milestone(101).with_protocol_params(change(102, 3)));

        assert_eq!(sink.unsupported(), vec![change(102, 3)]);
        assert_eq!(manager.current().version, 2);
    }

    #[test]
    fn test_replayed_milestone_does_not_double_append() {
        let announcing = milestone(101).with_protocol_params(change(110, 3));

        let (once, _) = setup(&[], Versions::new([2]));
        once.handle_confirmed_milestone(&announcing);

        let (twice, _) = setup(&[], Versions::new([2]));
        twice.handle_confirmed_milestone(&announcing);
        twice.handle_confirmed_milestone(&announcing);

        assert_eq!(once.pending().len(), 1);
        assert_eq!(twice.pending().len(), once.pending().len());
    }

    #[test]
    fn test_persistence_failure_is_critical_and_queues_nothing() {
        let inner = NodeStore::open_in_memory().unwrap();
        inner.append_change(&change(100, 2)).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let manager = Manager::with_supported_versions(
            Arc::new(ReadOnlyStore(inner)),
            100,
            Versions::range(2..=3),
            sink.clone(),
        )
        .unwrap();

        manager.handle_confirmed_milestone(&milestone(101).with_protocol_params(change(101, 3)));

        assert_eq!(sink.critical_count(), 1);
        assert!(manager.pending().is_empty());
        assert_eq!(manager.current().version, 2);
        let events = sink.events.lock().unwrap();
        match &events[0] {
            ProtocolEvent::CriticalError(ManagerError::Persistence(_)) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_payload_is_critical_and_keeps_state() {
        let mut broken = change(105, 3);
        // strict decoding rejects trailing data
        broken.params.push(0);
        let (manager, sink) = setup(&[broken.clone()], Versions::range(2..=3));

        manager.handle_confirmed_milestone(&milestone(105));

        assert_eq!(sink.critical_count(), 1);
        assert_eq!(manager.current().version, 2);
        assert_eq!(manager.pending(), vec![broken]);
        let events = sink.events.lock().unwrap();
        match &events[0] {
            ProtocolEvent::CriticalError(ManagerError::Activation { target: 105, .. }) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch_is_rejected_at_activation() {
        let mut mislabeled = change(105, 4);
        mislabeled.protocol_version = 3;
        let (manager, sink) = setup(&[mislabeled], Versions::range(2..=4));

        manager.handle_confirmed_milestone(&milestone(105));

        assert_eq!(sink.critical_count(), 1);
        assert_eq!(manager.current().version, 2);
    }

    #[test]
    fn test_pending_returns_a_copy() {
        let (manager, _sink) = setup(&[change(110, 3)], Versions::new([2]));

        let mut copy = manager.pending();
        copy[0].protocol_version = 9;
        copy.clear();

        assert_eq!(manager.pending(), vec![change(110, 3)]);
    }

    #[test]
    fn test_next_pending_supported_with_empty_queue() {
        let (manager, _sink) = setup(&[], Versions::new([2]));
        assert!(manager.next_pending_supported());
        assert_eq!(manager.supported_versions(), &Versions::new([2]));
    }

    #[test]
    fn test_readers_run_alongside_writer() {
        let changes: Vec<_> = (1..=5).map(|i| change(100 + i * 10, 2 + i as u8)).collect();
        let (manager, _sink) = setup(&changes, Versions::range(2..=7));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let version = manager.current().version;
                        assert!((2..=7).contains(&version));
                        let pending = manager.pending();
                        assert!(pending
                            .windows(2)
                            .all(|w| w[0].target_milestone_index <= w[1].target_milestone_index));
                        let _ = manager.next_pending_supported();
                    }
                });
            }

            for index in 101..=160 {
                manager.handle_confirmed_milestone(&milestone(index));
            }
        });

        assert_eq!(manager.current().version, 7);
        assert!(manager.pending().is_empty());
    }
}
