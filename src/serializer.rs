//! Binary and JSON encodings of catalog messages.
//!
//! JSON output uses the protobuf field names, renders enums by their protobuf
//! value names and always emits every field, so two laptops with the same
//! content render to the same text.

use std::path::Path;

use prost::Message;
use serde::Serialize;

use crate::proto::Laptop;
use crate::{Error, Result};

/// Serde adapters writing protobuf enum fields as their value names.
///
/// Values the schema does not know are written as plain numbers, and both forms
/// are accepted when reading.
#[doc(hidden)]
pub mod enum_names {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Name(String),
        Number(i32),
    }

    macro_rules! enum_names {
        ($($module:ident => $ty:ty),* $(,)?) => {$(
            pub mod $module {
                use super::*;

                pub fn serialize<S: Serializer>(value: &i32, serializer: S) -> Result<S::Ok, S::Error> {
                    match <$ty>::try_from(*value) {
                        Ok(known) => serializer.serialize_str(known.as_str_name()),
                        Err(_) => serializer.serialize_i32(*value),
                    }
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
                    match Repr::deserialize(deserializer)? {
                        Repr::Number(value) => Ok(value),
                        Repr::Name(name) => <$ty>::from_str_name(&name)
                            .map(|known| known as i32)
                            .ok_or_else(|| {
                                serde::de::Error::custom(format!("unknown enum value '{name}'"))
                            }),
                    }
                }
            }
        )*};
    }

    enum_names! {
        memory_unit => crate::proto::memory::Unit,
        storage_driver => crate::proto::storage::Driver,
        screen_panel => crate::proto::screen::Panel,
        keyboard_layout => crate::proto::keyboard::Layout,
    }
}

/// Renders any catalog message as indented JSON.
pub fn to_json<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string_pretty(message)
        .map_err(|e| Error::Internal(format!("cannot encode message as JSON: {e}")))
}

/// Renders a laptop as indented JSON.
pub fn laptop_to_json(laptop: &Laptop) -> Result<String> {
    to_json(laptop)
}

/// Parses a laptop from JSON produced by [`laptop_to_json`].
pub fn laptop_from_json(json: &str) -> Result<Laptop> {
    serde_json::from_str(json)
        .map_err(|e| Error::InvalidArgument(format!("cannot decode laptop JSON: {e}")))
}

/// Writes the protobuf binary encoding of `message` to `path`.
pub fn write_binary_file<M: Message>(message: &M, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, message.encode_to_vec())?;
    Ok(())
}

/// Reads a protobuf message from a file written by [`write_binary_file`].
pub fn read_binary_file<M: Message + Default>(path: impl AsRef<Path>) -> Result<M> {
    let bytes = std::fs::read(path)?;
    M::decode(bytes.as_slice())
        .map_err(|e| Error::InvalidArgument(format!("cannot decode protobuf message: {e}")))
}

/// Writes the JSON rendering of `message` to `path`.
pub fn write_json_file<T: Serialize>(message: &T, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, to_json(message)?)?;
    Ok(())
}
