use async_trait::async_trait;

use modelmux_types::RoutingSettings;

use super::RoutingSettingsSource;

/// Routing settings loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutingSettings {
    settings: RoutingSettings,
}

impl StaticRoutingSettings {
    pub fn new(settings: RoutingSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RoutingSettingsSource for StaticRoutingSettings {
    async fn get_routing_settings(&self) -> RoutingSettings {
        self.settings.clone()
    }
}
