//! Common domain types for the BGPVPN EVPN driver.
//!
//! This crate holds everything the driver needs that performs no I/O:
//!
//! - [`types`]: BGPVPN, association and topology records
//! - [`codec`]: BGPVPN <-> `external_ids` attribute bag mapping
//! - [`differ`]: attribute-level differences between BGPVPN snapshots
//! - [`keys`]: the metadata keys written onto logical switches
//! - [`error`]: the driver error taxonomy
//!
//! # Example
//!
//! ```
//! use bgpvpn_common::{codec, Bgpvpn};
//!
//! let vpn = Bgpvpn::new("v1", "l3")
//!     .with_vni(5000)
//!     .with_route_targets(["65000:1"]);
//! let ids = codec::build(&vpn).unwrap();
//! assert_eq!(ids["bgp_as"], "65000");
//! ```

pub mod codec;
pub mod differ;
pub mod error;
pub mod keys;
pub mod types;

pub use codec::{EvpnConfig, ExternalIds};
pub use differ::BgpvpnDiff;
pub use error::{DriverError, DriverResult};
pub use types::{
    Bgpvpn, BgpvpnType, NetworkAssociation, Port, PortAssociation, Router, RouterAssociation,
    Subnet,
};
