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

use crate::server::ServiceHandler;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Service name to handler map. Registering a name again replaces the
/// previous handler.
#[derive(Debug, Default)]
pub(crate) struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<ServiceHandler>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, returning the handler it replaced.
    pub fn insert(&self, name: String, handler: ServiceHandler) -> Option<Arc<ServiceHandler>> {
        self.services.write().insert(name, Arc::new(handler))
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceHandler>> {
        self.services.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }
}
