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

//! The request context carries what every backend call of one query needs:
//! the data source and region the call is scoped to and the deadline of the
//! caller.

use crate::error::{DatasourceError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Scope and deadline of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// The data source the query belongs to.
    pub datasource_id: i64,
    /// The resolved AWS region.
    pub region:        String,
    /// The instant after which the caller stops waiting.
    pub deadline:      Option<Instant>,
}

impl RequestContext {
    /// Creates a context without deadline.
    pub fn new(datasource_id: i64, region: impl Into<String>) -> Self {
        RequestContext {
            datasource_id,
            region: region.into(),
            deadline: None,
        }
    }

    /// Returns the context with a deadline.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns the context with a deadline `timeout` from now. A timeout too
    /// large for the clock leaves the context without deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now().checked_add(timeout))
    }

    /// Fails if the deadline has passed.
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DatasourceError::Timeout(
                "request deadline exceeded".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Runs a backend call, giving up when the deadline expires first.
    pub async fn call<F, T>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| {
                    DatasourceError::Timeout(format!("{} did not complete in time", operation))
                })?,
            None => call.await,
        }
    }

    /// Sleeps for `duration` or until the deadline, whichever is earlier.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        let wake = Instant::now().checked_add(duration);
        match self.deadline {
            Some(deadline) if wake.map_or(true, |wake| deadline < wake) => {
                tokio::time::sleep_until(deadline).await;
                self.check_deadline()
            }
            _ => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calls_without_deadline() -> Result<()> {
        let ctx = RequestContext::new(1, "us-east-1");
        assert_eq!(42, ctx.call("answer", async { Ok(42) }).await?);
        ctx.check_deadline()?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_deadline() {
        let ctx = RequestContext::new(1, "us-east-1").with_timeout(Duration::from_millis(10));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        assert!(matches!(
            ctx.call("get_query_results", slow).await,
            Err(DatasourceError::Timeout(_))
        ));
        assert!(matches!(ctx.check_deadline(), Err(DatasourceError::Timeout(_))));
    }

    #[tokio::test]
    async fn sleep_stops_at_deadline() {
        let ctx = RequestContext::new(1, "us-east-1").with_timeout(Duration::from_millis(10));
        let started = Instant::now();
        assert!(ctx.sleep(Duration::from_secs(5)).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn huge_timeouts() -> Result<()> {
        let ctx = RequestContext::new(1, "us-east-1").with_timeout(Duration::MAX);
        assert_eq!(None, ctx.deadline);
        assert_eq!(1, ctx.call("answer", async { Ok(1) }).await?);

        let ctx = RequestContext::new(1, "us-east-1").with_timeout(Duration::from_millis(10));
        let started = Instant::now();
        assert!(matches!(
            ctx.sleep(Duration::MAX).await,
            Err(DatasourceError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    }
}
