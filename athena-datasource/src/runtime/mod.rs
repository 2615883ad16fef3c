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

//! The query pipeline of the data source. A query runs in three stages:
//! the executor resolves it into completed query executions, the fetcher
//! pages through their results and the frame builder reshapes the rows.
//! Every stage receives a [`RequestContext`] that scopes its backend calls
//! to a data source, a region and the caller's deadline.

pub mod context;
pub mod executor;
pub mod fetcher;

pub use self::context::RequestContext;
pub use self::executor::QueryExecutor;
pub use self::fetcher::ResultFetcher;
