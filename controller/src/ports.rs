use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use trv_common::{ActuatorCommand, RestoredState};

#[async_trait]
pub trait ActuatorPort: Send + Sync {
    async fn command(&self, command: &ActuatorCommand) -> anyhow::Result<()>;
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn restore(&self, zone: &str) -> anyhow::Result<Option<RestoredState>>;
    async fn persist(&self, zone: &str, state: &RestoredState) -> anyhow::Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}
