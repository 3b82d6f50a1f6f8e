// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn machine_id_display_and_eq() {
    let id = MachineId::new("call-42");
    assert_eq!(id.to_string(), "call-42");
    assert_eq!(id, "call-42");
    assert_eq!(id.as_str(), "call-42");
}

#[test]
fn short_truncates_long_ids() {
    let id = MachineId::new("abcdefghij");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(20), "abcdefghij");
    assert_eq!("abc".short(2), "ab");
}

#[test]
fn ids_work_as_borrowed_map_keys() {
    let mut map: HashMap<MachineId, u32> = HashMap::new();
    map.insert(MachineId::new("sms-1"), 7);
    assert_eq!(map.get("sms-1"), Some(&7));
}

#[test]
fn run_ids_are_unique() {
    let a = RunId::generate();
    let b = RunId::generate();
    assert_ne!(a, b);
}

#[test]
fn id_serde_round_trip() {
    let id = MachineId::new("call-9");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"call-9\"");
    let back: MachineId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
