//! Channel endpoints.
//!
//! A router's ports are channels; a channel fans out to one or more
//! endpoints (e.g. the ATAC optical channel reaches every receive hub).
//! An [`Endpoint`] names a channel plus an index within it, with a
//! sentinel index meaning "all endpoints of the channel".

/// Sentinel endpoint index addressing every endpoint of a channel.
pub const ENDPOINT_ALL: i32 = -1;

/// One (channel, endpoint) coordinate at a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Channel id at the router.
    pub channel_id: i32,
    /// Endpoint index within the channel, or [`ENDPOINT_ALL`].
    pub index: i32,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(channel_id: i32, index: i32) -> Self {
        Self { channel_id, index }
    }

    /// Creates the all-endpoints coordinate for a channel.
    pub fn all(channel_id: i32) -> Self {
        Self {
            channel_id,
            index: ENDPOINT_ALL,
        }
    }

    /// Returns whether this endpoint addresses the whole channel.
    pub fn is_all(self) -> bool {
        self.index == ENDPOINT_ALL
    }
}
