//! Per-object property store: EPC -> value record, plus the INF/SET/GET
//! property-map sets and their 0x9D/0x9E/0x9F materializations.

use std::collections::BTreeMap;

use crate::codec::{decode_property_map, encode_property_map};

/// Which of the three property-map EPCs a call refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Inf,
    Set,
    Get,
}

impl MapKind {
    pub const fn epc(self) -> u8 {
        match self {
            MapKind::Inf => 0x9D,
            MapKind::Set => 0x9E,
            MapKind::Get => 0x9F,
        }
    }
}

/// A property value record: PDC is always `edt.len()`, never stored
/// separately, so the PDC == len(EDT) invariant can't drift.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyValue(pub Vec<u8>);

impl PropertyValue {
    pub fn new(edt: impl Into<Vec<u8>>) -> Self {
        Self(edt.into())
    }

    /// The PDC=0 "unknown/error" sentinel used for GET-family failures.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn pdc(&self) -> u8 {
        self.0.len() as u8
    }

    pub fn edt(&self) -> &[u8] {
        &self.0
    }
}

/// Property store for one local ECHONET object.
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    values: BTreeMap<u8, PropertyValue>,
    inf_map: Vec<u8>,
    set_map: Vec<u8>,
    get_map: Vec<u8>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, epc: u8) -> Option<&PropertyValue> {
        self.values.get(&epc)
    }

    /// Write a value record, PDC derived from `edt`'s length. Creates the
    /// entry if absent.
    pub fn set_value(&mut self, epc: u8, edt: impl Into<Vec<u8>>) {
        self.values.insert(epc, PropertyValue::new(edt));
    }

    pub fn get_map(&self, kind: MapKind) -> &[u8] {
        match kind {
            MapKind::Inf => &self.inf_map,
            MapKind::Set => &self.set_map,
            MapKind::Get => &self.get_map,
        }
    }

    /// Replace a property-map set and re-encode the corresponding
    /// 0x9D/0x9E/0x9F value record.
    pub fn set_map(&mut self, kind: MapKind, epcs: Vec<u8>) {
        let encoded = encode_property_map(&epcs);
        match kind {
            MapKind::Inf => self.inf_map = epcs,
            MapKind::Set => self.set_map = epcs,
            MapKind::Get => self.get_map = epcs,
        }
        self.values.insert(kind.epc(), PropertyValue::new(encoded));
    }

    pub fn has_inf(&self, epc: u8) -> bool {
        self.inf_map.contains(&epc)
    }

    pub fn has_set(&self, epc: u8) -> bool {
        self.set_map.contains(&epc)
    }

    pub fn has_get(&self, epc: u8) -> bool {
        self.get_map.contains(&epc)
    }
}

/// Decode a stored property-map value record back into its EPC list. Used
/// by diagnostics/tests; the dispatcher only ever reads `get_map`.
pub fn read_property_map(store: &PropertyStore, kind: MapKind) -> Vec<u8> {
    match store.get(kind.epc()) {
        Some(value) => decode_property_map(value.edt()),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_map_materializes_format1_encoding() {
        let mut store = PropertyStore::new();
        store.set_map(MapKind::Get, vec![0x80, 0x81, 0x82]);
        let value = store.get(0x9F).unwrap();
        assert_eq!(value.edt(), &[0x03, 0x80, 0x81, 0x82]);
        assert_eq!(value.pdc(), 4);
        assert!(store.has_get(0x81));
        assert!(!store.has_get(0x90));
    }

    #[test]
    fn set_map_materializes_format2_encoding() {
        let mut store = PropertyStore::new();
        let epcs: Vec<u8> = (0x80..0x80 + 16).collect();
        store.set_map(MapKind::Set, epcs.clone());
        let value = store.get(0x9E).unwrap();
        assert_eq!(value.pdc(), 17);
        assert_eq!(read_property_map(&store, MapKind::Set), epcs);
    }

    #[test]
    fn set_value_recomputes_pdc() {
        let mut store = PropertyStore::new();
        store.set_value(0x80, vec![0x30]);
        assert_eq!(store.get(0x80).unwrap().pdc(), 1);
        store.set_value(0x80, Vec::new());
        assert_eq!(store.get(0x80).unwrap().pdc(), 0);
    }

    #[test]
    fn unknown_epc_is_none() {
        let store = PropertyStore::new();
        assert!(store.get(0x7F).is_none());
    }
}
