//! Location subsystem for the Souq front end.
//!
//! Acquires a device position under a retry/accuracy profile and turns it
//! into a display address through a gazetteer, an optional address cache,
//! the reverse-geocoding proxy, and a latitude-band fallback.

pub mod accuracy;
pub mod acquirer;
pub mod cache;
pub mod device;
pub mod gazetteer;
pub mod geocoder;
pub mod resolver;
pub mod service;
pub mod types;

pub use accuracy::{classify, AccuracyTier, Profile, ProfileName};
pub use acquirer::LocationAcquirer;
pub use cache::{AddressCache, FileAddressCache};
pub use device::{DeviceError, DeviceLocation, IpDevice, NoDevice, PositionCallback, RequestOptions};
pub use gazetteer::{Gazetteer, GazetteerError, PlaceCandidate};
pub use geocoder::{GeocodeError, NominatimClient, ProxyGeocoder, ReverseGeocoder};
pub use resolver::{AddressResolver, LatitudeBand, ResolverConfig};
pub use service::LocationService;
pub use types::{
    AcquisitionError, AddressSource, Coordinate, CoordinateError, ProgressEvent, Reading, ResolvedLocation,
};
