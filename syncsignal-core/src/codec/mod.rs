/*
    Codec subsystem - Envelope serialization

    Converts between in-memory values and the JSON text carried by both
    transports, including reversible encoding of dates.
*/

pub mod envelope;
pub mod value;

pub use envelope::{decode_envelope, decode_value, encode_envelope, encode_value, Envelope};
pub use value::{SyncValue, DATE_TAG, INVALID_DATE_PREFIX};
