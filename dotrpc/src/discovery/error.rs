//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Discovery error types.

use thiserror::Error;

/// Errors raised while starting or managing a discovery session.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// This runtime already has an active discovery session.
    #[error("discovery session already active")]
    AlreadyAdvertising,

    /// The merged options could not be turned into session options.
    #[error("invalid discovery options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    /// The session was stopped and cannot be restarted.
    #[error("discovery session is closed")]
    Closed,
}
