use async_trait::async_trait;

use modelmux_types::{Provider, ProviderConfig};

use super::ProviderRegistry;

/// Registry backed by a fixed provider list (gateway file).
#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    providers: Vec<Provider>,
}

impl StaticProviderRegistry {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    fn is_allowed(name: &str, allowed: Option<&[String]>) -> bool {
        allowed.map_or(true, |names| names.iter().any(|n| n == name))
    }
}

#[async_trait]
impl ProviderRegistry for StaticProviderRegistry {
    async fn get_all_providers(&self, allowed: Option<&[String]>) -> Vec<Provider> {
        self.providers.iter().filter(|p| Self::is_allowed(&p.name, allowed)).cloned().collect()
    }

    async fn get_provider_config(
        &self,
        name: &str,
        allowed: Option<&[String]>,
    ) -> Option<ProviderConfig> {
        if !Self::is_allowed(name, allowed) {
            return None;
        }
        self.providers.iter().find(|p| p.name == name).map(ProviderConfig::from)
    }
}
