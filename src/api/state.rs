use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::config::ConfigHandle;
use crate::dispatch::Dispatcher;
use crate::logs::LogBroker;
use crate::observability::Metrics;
use crate::queue::Queue;
use crate::store::Store;
use crate::webhook::WebhookTranslator;

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub store: Arc<Store>,
    pub queue: Arc<Queue>,
    pub dispatcher: Arc<Dispatcher>,
    pub agents: Arc<AgentRegistry>,
    pub log_broker: Arc<LogBroker>,
    pub webhook: Arc<WebhookTranslator>,
    pub metrics: Arc<Metrics>,
}
