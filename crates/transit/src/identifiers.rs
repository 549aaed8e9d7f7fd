//! Identifiers for stops, lines and vehicles.
//!
//! All identifiers use Arc<str> so snapshots can be cloned across sync cycles cheaply.

use std::sync::Arc;
use std::fmt;
use std::hash::{Hash, Hasher};

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

impl_identifier!(StopIdentifier);
impl_identifier!(StopCode);
impl_identifier!(LineIdentifier);
impl_identifier!(VehicleIdentifier);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_equality() {
        let code1 = StopCode::new("PA433");
        let code2 = StopCode::new("PA433");
        let code3 = code1.clone();

        assert_eq!(code1, code2);
        assert_eq!(code1, code3);
        assert!(Arc::ptr_eq(&code1.0, &code3.0)); // Clone shares Arc
    }

    #[test]
    fn test_stop_code_is_case_sensitive() {
        assert_ne!(StopCode::new("PA433"), StopCode::new("pa433"));
    }

    #[test]
    fn test_line_vehicle_pair_as_key() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert((LineIdentifier::new("506"), VehicleIdentifier::new("FLXR-12")), 42);

        assert_eq!(
            map.get(&(LineIdentifier::new("506"), VehicleIdentifier::new("FLXR-12"))),
            Some(&42)
        );
        assert_eq!(
            map.get(&(LineIdentifier::new("506e"), VehicleIdentifier::new("FLXR-12"))),
            None
        );
    }

    #[test]
    fn test_identifier_display() {
        let id = LineIdentifier::new("D18");
        assert_eq!(format!("{}", id), "D18");
    }

    #[test]
    fn test_identifier_conversions() {
        let _id1: VehicleIdentifier = "BJFK-55".into();
        let _id2: StopIdentifier = String::from("12345").into();
    }
}
