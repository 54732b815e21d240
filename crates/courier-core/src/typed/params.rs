//! TaskParamsKind: ties a task type name to its parameter struct.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{PerpetualTaskType, TaskParams};
use crate::error::CourierError;

/// Concrete parameters of one perpetual task type.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct K8sWatchParams {
///     cluster_id: String,
/// }
///
/// impl TaskParamsKind for K8sWatchParams {
///     const TYPE: &'static str = "K8S_WATCH";
/// }
/// ```
pub trait TaskParamsKind: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Must match the `PerpetualTaskType` the client registers under.
    const TYPE: &'static str;

    fn task_type() -> PerpetualTaskType {
        PerpetualTaskType::new(Self::TYPE)
    }

    fn to_task_params(&self) -> Result<TaskParams, CourierError> {
        Ok(TaskParams::new(Self::task_type(), serde_json::to_value(self)?))
    }

    fn from_task_params(params: &TaskParams) -> Result<Self, CourierError> {
        if params.task_type.as_str() != Self::TYPE {
            return Err(CourierError::InvalidArgument(format!(
                "expected {} params, got {}",
                Self::TYPE,
                params.task_type
            )));
        }
        Ok(serde_json::from_value(params.payload.clone())?)
    }
}
