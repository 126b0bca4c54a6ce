// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ids_are_unique() {
    assert_ne!(new_id(), new_id());
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef-123456", 6), "abcdef");
    assert_eq!(short("abc", 6), "abc");
    assert_eq!(short("", 6), "");
}
