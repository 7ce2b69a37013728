//! Bus transport abstraction
//!
//! The only interface through which the engine touches the physical link.
//! Implementations encode descriptors onto the wire; the engine never does.

use crate::dsi::{Descriptor, TransmissionSpeed};

/// Blocking command transport for one panel link.
pub trait BusTransport {
    /// Send `descriptors` in order at `speed`.
    ///
    /// Returns the number of payload bytes put on the wire.
    fn send(
        &mut self,
        descriptors: &[Descriptor],
        speed: TransmissionSpeed,
    ) -> Result<usize, TransportError>;
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    fn send(
        &mut self,
        descriptors: &[Descriptor],
        speed: TransmissionSpeed,
    ) -> Result<usize, TransportError> {
        (**self).send(descriptors, speed)
    }
}

/// Transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Host controller rejected the command list
    Rejected,
    /// Peripheral did not acknowledge
    Nack,
    /// Link timed out mid-transfer
    Timeout,
    /// Link is down (clocks off, PHY not ready)
    LinkDown,
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rejected => write!(f, "Transport rejected command list"),
            Self::Nack => write!(f, "Panel did not acknowledge"),
            Self::Timeout => write!(f, "Transport timeout"),
            Self::LinkDown => write!(f, "Link is down"),
        }
    }
}
