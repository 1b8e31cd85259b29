//! ECHONET Object (EOJ) identity: class-group, class, instance.

use std::fmt;

use crate::error::EojDisplay;

/// A 3-byte ECHONET object identifier.
///
/// Instance `0` is a wildcard meaning "all instances of this class on this
/// node", expanded by the dispatcher into one call per served instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eoj {
    pub class_group: u8,
    pub class: u8,
    pub instance: u8,
}

/// `05 FF 01`, the generic controller object used as SEOJ/DEOJ for
/// spontaneous notifications and as the implicit sender of requests.
pub const CONTROLLER: Eoj = Eoj::new(0x05, 0xFF, 0x01);

/// `0E F0 01`, the mandatory node profile object.
pub const NODE_PROFILE: Eoj = Eoj::new(0x0E, 0xF0, 0x01);

const NODE_PROFILE_CLASS_GROUP: u8 = 0x0E;
const NODE_PROFILE_CLASS: u8 = 0xF0;

impl Eoj {
    pub const fn new(class_group: u8, class: u8, instance: u8) -> Self {
        Self {
            class_group,
            class,
            instance,
        }
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [self.class_group, self.class, self.instance]
    }

    /// An EOJ whose class-group/class is `0E F0` is the node profile class;
    /// instances 0, 1 and 2 all resolve to the single profile object.
    pub fn is_node_profile_class(self) -> bool {
        self.class_group == NODE_PROFILE_CLASS_GROUP && self.class == NODE_PROFILE_CLASS
    }

    /// True for instances 0/1/2 of the node profile class; all three
    /// addresses resolve to the one `0E F0 01` object.
    pub fn is_node_profile_alias(self) -> bool {
        self.is_node_profile_class() && matches!(self.instance, 0x00 | 0x01 | 0x02)
    }

    pub fn is_wildcard(self) -> bool {
        self.instance == 0
    }

    /// Same class-group and class, ignoring instance.
    pub fn same_class(self, other: Eoj) -> bool {
        self.class_group == other.class_group && self.class == other.class
    }

    pub fn with_instance(self, instance: u8) -> Eoj {
        Eoj::new(self.class_group, self.class, instance)
    }
}

impl From<EojDisplay> for Eoj {
    fn from(d: EojDisplay) -> Self {
        Eoj::new(d.0, d.1, d.2)
    }
}

impl From<Eoj> for EojDisplay {
    fn from(eoj: Eoj) -> Self {
        EojDisplay(eoj.class_group, eoj.class, eoj.instance)
    }
}

impl fmt::Debug for Eoj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}{:02X}",
            self.class_group, self.class, self.instance
        )
    }
}

impl fmt::Display for Eoj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_profile_alias_covers_0_1_2() {
        for instance in [0x00, 0x01, 0x02] {
            assert!(Eoj::new(0x0E, 0xF0, instance).is_node_profile_alias());
        }
        assert!(!Eoj::new(0x0E, 0xF0, 0x03).is_node_profile_alias());
    }

    #[test]
    fn wildcard_matches_class_only() {
        let wildcard = Eoj::new(0x02, 0x90, 0x00);
        let concrete = Eoj::new(0x02, 0x90, 0x01);
        assert!(wildcard.is_wildcard());
        assert!(wildcard.same_class(concrete));
        assert!(!concrete.same_class(Eoj::new(0x02, 0x91, 0x01)));
    }
}
