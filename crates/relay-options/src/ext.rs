//! Extension trait for [`OptionStore`] with typed convenience methods.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::OptionStore;

/// Typed convenience methods for [`OptionStore`].
///
/// Host option tables store booleans as `"1"`/`"0"` strings. The coercion
/// lives here so the rest of the code only ever sees `bool`:
///
/// - [`OptionStore`] stays object-safe with no serde dependency
/// - Backends only need to handle strings
/// - Callers get typed access via a blanket impl
pub trait OptionStoreExt: OptionStore {
    /// Read an option, falling back to `default` when it is unset.
    fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_owned())
    }

    /// Read a boolean option.
    ///
    /// `"1"`, `"true"`, `"yes"` and `"on"` are true; `"0"`, `"false"`, `"no"`,
    /// `"off"` and the empty string are false (case-insensitive). Unset or
    /// unrecognized values yield `default`.
    fn get_flag(&self, name: &str, default: bool) -> bool {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            other => {
                tracing::debug!(option = name, value = other, "unrecognized flag value");
                default
            }
        }
    }

    /// Write a boolean option as `"1"` or `"0"`.
    fn set_flag(&self, name: &str, value: bool) -> bool {
        self.set(name, if value { "1" } else { "0" })
    }

    /// Read a JSON-encoded option.
    ///
    /// Returns `None` when unset or when the stored value does not decode.
    fn get_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let raw = self.get(name)?;
        serde_json::from_str(&raw).ok()
    }

    /// Write a value as JSON. Returns `false` if serialization fails.
    fn set_json<T: Serialize>(&self, name: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(name, &raw),
            Err(e) => {
                tracing::warn!(option = name, "failed to encode option: {e}");
                false
            }
        }
    }
}

impl<S: OptionStore + ?Sized> OptionStoreExt for S {}
