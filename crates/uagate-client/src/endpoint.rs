// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint resolution with a process-lifetime cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ClientResult;
use crate::stack::ProtocolStack;
use crate::types::{EndpointDescriptor, ServerAddress};

/// Resolves and caches the most secure endpoint of each server.
///
/// Successful discoveries are cached until the process exits. Failures are
/// not cached, so the next call retries discovery. Two callers racing on an
/// unresolved address may both discover; the later insert wins.
pub struct EndpointResolver {
    stack: Arc<dyn ProtocolStack>,
    cache: Mutex<HashMap<ServerAddress, EndpointDescriptor>>,
}

impl EndpointResolver {
    /// Creates a resolver over a protocol stack.
    pub fn new(stack: Arc<dyn ProtocolStack>) -> Self {
        Self {
            stack,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the endpoint for an address, discovering it on a cache miss.
    pub async fn resolve(&self, address: &ServerAddress) -> ClientResult<EndpointDescriptor> {
        if let Some(cached) = self.cached(address) {
            return Ok(cached);
        }

        let descriptor = match self.stack.discover(address).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Endpoint discovery failed");
                return Err(e);
            }
        };

        tracing::info!(
            address = %address,
            endpoint = %descriptor.endpoint_url,
            security_policy = %descriptor.security_policy_uri,
            security_mode = %descriptor.security_mode,
            "Endpoint resolved"
        );

        self.cache.lock().insert(address.clone(), descriptor.clone());
        Ok(descriptor)
    }

    /// Returns the cached endpoint without discovery.
    pub fn cached(&self, address: &ServerAddress) -> Option<EndpointDescriptor> {
        self.cache.lock().get(address).cloned()
    }

    /// Number of cached endpoints.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl std::fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointResolver")
            .field("cached", &self.len())
            .finish()
    }
}
