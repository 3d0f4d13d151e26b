//! Lazily constructed, cached gateway instances.

use super::{FlutterwaveGateway, MockGateway, PaymentGateway, PaystackGateway, WalletGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::GatewayType;
use crate::services::store::WalletLedger;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of initialized gateways, one instance per [`GatewayType`].
///
/// Built once at startup and shared by `Arc`. Lookup, construction and
/// insertion for a type all happen under that type's map entry lock, so
/// concurrent first requests observe a single instance.
pub struct GatewayFactory {
    cache: DashMap<GatewayType, Arc<dyn PaymentGateway>>,
    ledger: Arc<dyn WalletLedger>,
    http: reqwest::Client,
}

impl GatewayFactory {
    pub fn new(ledger: Arc<dyn WalletLedger>, http: reqwest::Client) -> Self {
        Self {
            cache: DashMap::new(),
            ledger,
            http,
        }
    }

    /// Returns the cached instance for `gateway`, building and initializing it
    /// on first use. Disabled gateways fail before the cache is consulted; a
    /// failed initialization caches nothing.
    pub fn get_gateway(
        &self,
        gateway: GatewayType,
        config: &GatewayConfig,
    ) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        if !config.enabled {
            return Err(GatewayError::Disabled(gateway));
        }

        let entry = self.cache.entry(gateway).or_try_insert_with(|| {
            let mut instance = self.construct(gateway);
            instance.initialize(config)?;
            tracing::info!(gateway = %gateway, "Payment gateway initialized");
            Ok::<_, GatewayError>(Arc::from(instance))
        })?;

        Ok(entry.value().clone())
    }

    fn construct(&self, gateway: GatewayType) -> Box<dyn PaymentGateway> {
        match gateway {
            GatewayType::Wallet => Box::new(WalletGateway::new(self.ledger.clone())),
            GatewayType::Mock => Box::new(MockGateway::new()),
            GatewayType::Paystack => Box::new(PaystackGateway::new(self.http.clone())),
            GatewayType::Flutterwave => Box::new(FlutterwaveGateway::new(self.http.clone())),
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
        tracing::info!("Payment gateway cache cleared");
    }

    /// Drops one cached instance so the next request rebuilds it from current
    /// configuration. Returns whether anything was cached.
    pub fn evict(&self, gateway: GatewayType) -> bool {
        let removed = self.cache.remove(&gateway).is_some();
        tracing::info!(gateway = %gateway, removed, "Payment gateway evicted");
        removed
    }

    pub fn cached_types(&self) -> Vec<GatewayType> {
        let mut types: Vec<GatewayType> = self.cache.iter().map(|e| *e.key()).collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
