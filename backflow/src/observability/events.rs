//! Event names used in the `event` field of structured logs.

pub const ERROR_DROPPED: &str = "error_dropped";

pub const DEMAND_REQUESTED: &str = "demand_requested";
pub const DEMAND_REJECTED: &str = "demand_rejected";
pub const SUBSCRIPTION_CANCELLED: &str = "subscription_cancelled";
pub const SUBSCRIPTION_TERMINATED: &str = "subscription_terminated";

pub const PULL_SOURCE_OPENED: &str = "pull_source_opened";
pub const PULL_SOURCE_OPEN_FAILED: &str = "pull_source_open_failed";
pub const PULL_SOURCE_CLOSED: &str = "pull_source_closed";
pub const PULL_SOURCE_CLOSE_FAILED: &str = "pull_source_close_failed";

pub const PUSH_ITEM_DROPPED: &str = "push_item_dropped";
pub const PUSH_QUEUE_OVERFLOW: &str = "push_queue_overflow";
pub const PUSH_PRODUCER_STARTED: &str = "push_producer_started";

pub const HUB_SLOT_JOINED: &str = "hub_slot_joined";
pub const HUB_SLOT_LEFT: &str = "hub_slot_left";
pub const HUB_CONNECTING: &str = "hub_connecting";
pub const HUB_CONNECTED: &str = "hub_connected";
pub const HUB_DISCONNECTED: &str = "hub_disconnected";
pub const HUB_TERMINATED: &str = "hub_terminated";

pub const SCHEDULER_WORKER_STARTED: &str = "scheduler_worker_started";
pub const SCHEDULER_WORKER_STOPPED: &str = "scheduler_worker_stopped";
pub const SCHEDULER_TASK_REJECTED: &str = "scheduler_task_rejected";

pub const OPERATOR_RECOVERED: &str = "operator_recovered";
pub const OPERATOR_SWITCHED: &str = "operator_switched";
pub const OPERATOR_TIMED_OUT: &str = "operator_timed_out";
