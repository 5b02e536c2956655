use super::{
    FloozAdapter, MoovAdapter, MtnAdapter, OrangeAdapter, PaypalAdapter, StripeAdapter, WaveAdapter,
};
use crate::config::{ProviderConfig, Settings};
use crate::domain::ports::{SharedHttpTransport, SharedPaymentProvider};
use crate::domain::provider::ProviderId;
use std::sync::Arc;

/// An adapter together with the configuration it was built from.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub adapter: SharedPaymentProvider,
    pub config: ProviderConfig,
}

/// The set of active providers, kept in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the adapter for `adapter.id()`.
    pub fn register(&mut self, adapter: SharedPaymentProvider, config: ProviderConfig) {
        let entry = RegisteredProvider { adapter, config };
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.adapter.id() == entry.adapter.id())
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Builds one HTTP adapter per configured provider.
    pub fn from_settings(settings: &Settings, transport: SharedHttpTransport) -> Self {
        let mut registry = Self::new();
        for id in ProviderId::ALL {
            let Some(config) = settings.providers.get(&id).cloned() else {
                continue;
            };
            let transport = transport.clone();
            let adapter: SharedPaymentProvider = match id {
                ProviderId::Mtn => Arc::new(MtnAdapter::new(config.clone(), transport)),
                ProviderId::Moov => Arc::new(MoovAdapter::new(config.clone(), transport)),
                ProviderId::Flooz => Arc::new(FloozAdapter::new(config.clone(), transport)),
                ProviderId::Orange => Arc::new(OrangeAdapter::new(config.clone(), transport)),
                ProviderId::Wave => Arc::new(WaveAdapter::new(config.clone(), transport)),
                ProviderId::Paypal => Arc::new(PaypalAdapter::new(config.clone(), transport)),
                ProviderId::Stripe => Arc::new(StripeAdapter::new(config.clone(), transport)),
            };
            registry.register(adapter, config);
        }
        registry
    }

    pub fn get(&self, id: ProviderId) -> Option<&RegisteredProvider> {
        self.entries.iter().find(|entry| entry.adapter.id() == id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.entries.iter().map(|entry| entry.adapter.id()).collect()
    }
}
