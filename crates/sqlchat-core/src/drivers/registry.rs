//! Driver registry: engine → adapter

use std::collections::HashMap;
use std::sync::Arc;

use super::error::{DriverError, DriverResult};
use super::mysql::MySqlDriver;
use super::postgres::PostgresDriver;
use super::traits::DatabaseDriver;
use crate::logging::Logger;
use crate::types::{DatabaseConnection, DriverKind};

#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<DriverKind, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(logger: Arc<dyn Logger>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostgresDriver::new(logger.clone())));
        registry.register(Arc::new(MySqlDriver::mysql(logger.clone())));
        registry.register(Arc::new(MySqlDriver::mariadb(logger)));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        self.drivers.insert(driver.kind(), driver);
    }

    pub fn get(&self, kind: DriverKind) -> Option<Arc<dyn DatabaseDriver>> {
        self.drivers.get(&kind).cloned()
    }

    /// Adapter for a stored connection record
    pub fn for_connection(&self, connection: &DatabaseConnection) -> DriverResult<Arc<dyn DatabaseDriver>> {
        connection
            .driver_kind()
            .ok()
            .and_then(|kind| self.get(kind))
            .ok_or_else(|| DriverError::UnsupportedDriver(connection.driver.clone()))
    }
}
