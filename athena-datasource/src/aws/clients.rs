// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Backend clients are expensive to build, so they are created once per data
//! source and region and shared by every request.

use super::{AthenaService, QueryService};
use crate::error::Result;
use dashmap::DashMap;
use log::info;
use std::sync::Arc;

/// Builds the client of a region.
pub type ClientFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn QueryService>> + Send + Sync>;

/// A pool of backend clients keyed by data source id and region.
pub struct ClientPool {
    factory: ClientFactory,
    clients: DashMap<String, Arc<dyn QueryService>>,
}

impl ClientPool {
    /// Creates a pool that builds its clients with `factory`.
    pub fn new(factory: ClientFactory) -> Self {
        ClientPool {
            factory,
            clients: DashMap::new(),
        }
    }

    /// Creates a pool of rusoto Athena clients.
    pub fn athena() -> Self {
        ClientPool::new(Arc::new(|region: &str| -> Result<Arc<dyn QueryService>> {
            Ok(Arc::new(AthenaService::new(region)?))
        }))
    }

    /// Returns the client of the data source in the given region, creating it
    /// on first use.
    pub fn get(&self, datasource_id: i64, region: &str) -> Result<Arc<dyn QueryService>> {
        let key = format!("{}/{}", datasource_id, region);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        info!("Creating Athena client for data source {} in {}", datasource_id, region);
        let client = (self.factory)(region)?;
        Ok(self.clients.entry(key).or_insert(client).clone())
    }

    /// Returns the number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no client has been created yet.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
