//! Client Request Matrix
//!
//! A sparse (sensor × client) table of rate/latency requests, stored in a
//! bounded slab. Scanned by the arbiter to work out what a sensor must be
//! told to do.
//!
//! Invariant: at most one live entry per (handle, client) pair. Every
//! mutation either completes or leaves the matrix untouched.

use crate::constants::MAX_CLI_SENS_MATRIX_SZ;
use crate::errors::{HubError, HubResult};
use crate::rate::SensorRate;
use crate::sensor::{ClientId, SensorHandle};
use crate::slab::SlabPool;

/// One client's request on one sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRequest {
    /// Sensor requested
    pub handle: SensorHandle,
    /// Requesting client
    pub client: ClientId,
    /// Requested rate
    pub rate: SensorRate,
    /// Requested latency (ns), already floored to one sampling period
    pub latency: u64,
}

/// Bounded table of live requests
pub struct RequestMatrix {
    entries: SlabPool<ClientRequest, MAX_CLI_SENS_MATRIX_SZ>,
}

impl RequestMatrix {
    /// Empty matrix
    pub fn new() -> Self {
        Self {
            entries: SlabPool::new(),
        }
    }

    /// Record a new request
    pub fn add(&mut self, handle: SensorHandle, client: ClientId, rate: SensorRate, latency: u64) -> HubResult<()> {
        if self.find(handle, client).is_some() {
            return Err(HubError::AlreadyRequested);
        }
        self.entries
            .alloc(ClientRequest { handle, client, rate, latency })
            .map(|_| ())
            .map_err(|_| HubError::RequestMatrixFull)
    }

    /// Replace an existing request in place
    pub fn amend(&mut self, handle: SensorHandle, client: ClientId, rate: SensorRate, latency: u64) -> HubResult<()> {
        let idx = self
            .entries
            .position(|req| req.handle == handle && req.client == client)
            .ok_or(HubError::NoRequest)?;
        if let Some(req) = self.entries.get_mut(idx) {
            req.rate = rate;
            req.latency = latency;
        }
        Ok(())
    }

    /// Remove a request, returning it
    pub fn remove(&mut self, handle: SensorHandle, client: ClientId) -> HubResult<ClientRequest> {
        let idx = self
            .entries
            .position(|req| req.handle == handle && req.client == client)
            .ok_or(HubError::NoRequest)?;
        self.entries.free(idx).ok_or(HubError::NoRequest)
    }

    /// Look up a request
    pub fn find(&self, handle: SensorHandle, client: ClientId) -> Option<&ClientRequest> {
        self.entries
            .iter()
            .map(|(_, req)| req)
            .find(|req| req.handle == handle && req.client == client)
    }

    /// All live requests on one sensor
    pub fn for_sensor(&self, handle: SensorHandle) -> impl Iterator<Item = &ClientRequest> {
        self.entries
            .iter()
            .map(|(_, req)| req)
            .filter(move |req| req.handle == handle)
    }

    /// Drop every request on a sensor, returning how many went
    pub fn remove_sensor(&mut self, handle: SensorHandle) -> usize {
        self.entries.retain(|req| req.handle != handle)
    }

    /// Handle of some sensor the client still holds a request on
    pub fn first_for_client(&self, client: ClientId) -> Option<SensorHandle> {
        self.entries
            .iter()
            .map(|(_, req)| req)
            .find(|req| req.client == client)
            .map(|req| req.handle)
    }

    /// Number of live requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no request is live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RequestMatrix {
    fn default() -> Self {
        Self::new()
    }
}
