//! In-memory broker double for dispatch-side tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use lexiclass_core::{
    ActiveTask, BrokerState, BrokerTaskState, Result, SubmitTask, TaskBroker, TaskStatus,
};

/// Recording broker: remembers every submission and revocation, and serves
/// states planted by the test.
#[derive(Default)]
pub struct MockBroker {
    submissions: Mutex<Vec<SubmitTask>>,
    submitted_ids: Mutex<Vec<Uuid>>,
    states: Mutex<HashMap<Uuid, BrokerTaskState>>,
    revoked: Mutex<Vec<Uuid>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every submission the broker has seen, in order.
    pub fn submissions(&self) -> Vec<SubmitTask> {
        self.submissions.lock().unwrap().clone()
    }

    /// Ids returned to submitters, in order.
    pub fn submitted_ids(&self) -> Vec<Uuid> {
        self.submitted_ids.lock().unwrap().clone()
    }

    /// Ids revoked so far, in order.
    pub fn revoked(&self) -> Vec<Uuid> {
        self.revoked.lock().unwrap().clone()
    }

    /// Plant a broker state for a task id.
    pub fn set_state(&self, task_id: Uuid, state: BrokerTaskState) {
        self.states.lock().unwrap().insert(task_id, state);
    }

    /// Convenience: plant a bare state with no result, error, or retries.
    pub fn set_simple_state(&self, task_id: Uuid, state: BrokerState) {
        self.set_state(
            task_id,
            BrokerTaskState {
                state,
                retry_count: 0,
                result: None,
                error: None,
                started_at: None,
            },
        );
    }
}

#[async_trait]
impl TaskBroker for MockBroker {
    async fn submit(&self, task: SubmitTask) -> Result<Uuid> {
        let task_id = Uuid::new_v4();
        self.submissions.lock().unwrap().push(task);
        self.submitted_ids.lock().unwrap().push(task_id);
        self.states.lock().unwrap().insert(
            task_id,
            BrokerTaskState {
                state: BrokerState::Pending,
                retry_count: 0,
                result: None,
                error: None,
                started_at: None,
            },
        );
        Ok(task_id)
    }

    async fn state(&self, task_id: Uuid) -> Result<Option<BrokerTaskState>> {
        Ok(self.states.lock().unwrap().get(&task_id).cloned())
    }

    async fn revoke(&self, task_id: Uuid) -> Result<()> {
        self.revoked.lock().unwrap().push(task_id);
        if let Some(state) = self.states.lock().unwrap().get_mut(&task_id) {
            if !state.state.is_terminal() {
                state.state = BrokerState::Cancelled;
            }
        }
        Ok(())
    }

    async fn active_for_project(&self, project_id: i64) -> Result<Vec<ActiveTask>> {
        let states = self.states.lock().unwrap();
        let submitted = self.submitted_ids.lock().unwrap();
        let submissions = self.submissions.lock().unwrap();

        Ok(submitted
            .iter()
            .zip(submissions.iter())
            .filter_map(|(id, task)| {
                let state = states.get(id)?;
                if state.state == BrokerState::Running && task.project_id == project_id {
                    Some(ActiveTask {
                        task_id: *id,
                        task_name: task.task_name.clone(),
                        status: TaskStatus::from_broker(state.state, state.retry_count),
                        started_at: state.started_at,
                    })
                } else {
                    None
                }
            })
            .collect())
    }
}
