/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements Morton (Z-order) and Hilbert encoding and decoding of octree cell coordinates.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::morton_constants::{
    BYTE_DISPLACEMENT, BYTE_MASK, HILBERT_TO_MORTON, MORTON_DECODE_3D_X_LOOKUP,
    MORTON_DECODE_3D_Y_LOOKUP, MORTON_DECODE_3D_Z_LOOKUP, MORTON_ENCODE_3D_LOOKUP,
    MORTON_TO_HILBERT, NINE_BIT_MASK,
};

/// Each coordinate bit of a cell becomes one bit of a 3-bit triplet, `x << 2 | y << 1 | z`.
/// The most significant triplet selects the child of the root, the least significant the
/// leaf within its parent. Codes are level-relative: a level `l` code uses `3 * l` bits.
///
/// The lookup-table approach follows:
/// - [`Libmorton`](https://github.com/Forceflow/libmorton)

/// Number of children of a cell.
pub const NB_CHILDREN: usize = 8;

/// Mask of the lowest triplet of a code.
const TRIPLET_MASK: u64 = 0b111;

/// Spreads a coordinate of at most 21 bits so that bit `b` moves to bit `3b`.
#[inline(always)]
fn spread(coordinate: u64) -> u64 {
    let mut spread = 0;
    for byte in (0..3).rev() {
        spread <<= 3 * BYTE_DISPLACEMENT;
        spread |= MORTON_ENCODE_3D_LOOKUP
            [((coordinate >> (byte * BYTE_DISPLACEMENT)) & BYTE_MASK) as usize];
    }
    spread
}

/// Interleaves three grid coordinates into a Morton code.
#[inline(always)]
pub fn encode_morton(position: [u64; 3]) -> u64 {
    (spread(position[0]) << 2) | (spread(position[1]) << 1) | spread(position[2])
}

/// Splits a Morton code back into its three grid coordinates.
#[inline(always)]
pub fn decode_morton(code: u64) -> [u64; 3] {
    let mut position = [0u64; 3];
    for chunk in 0..7 {
        let bits = ((code >> (9 * chunk)) & NINE_BIT_MASK) as usize;
        position[0] |= (MORTON_DECODE_3D_X_LOOKUP[bits] as u64) << (3 * chunk);
        position[1] |= (MORTON_DECODE_3D_Y_LOOKUP[bits] as u64) << (3 * chunk);
        position[2] |= (MORTON_DECODE_3D_Z_LOOKUP[bits] as u64) << (3 * chunk);
    }
    position
}

/// Runs `code` through one of the curve state machines, root triplet first.
///
/// Only the `level` lowest triplets take part, so a parent code converts to the
/// prefix of its children's converted codes.
fn convert(code: u64, level: usize, table: &[[(u8, u8); 8]; 12]) -> u64 {
    let mut state = 0usize;
    let mut converted = 0;
    for triplet_level in (0..level).rev() {
        let shift = 3 * triplet_level;
        let triplet = ((code >> shift) & TRIPLET_MASK) as usize;
        let (next_triplet, next_state) = table[state][triplet];
        converted |= (next_triplet as u64) << shift;
        state = next_state as usize;
    }
    converted
}

/// Remaps a level `level` Morton code onto the Hilbert curve.
pub fn morton_to_hilbert(code: u64, level: usize) -> u64 {
    convert(code, level, &MORTON_TO_HILBERT)
}

/// Inverse of [`morton_to_hilbert`].
pub fn hilbert_to_morton(code: u64, level: usize) -> u64 {
    convert(code, level, &HILBERT_TO_MORTON)
}

#[inline(always)]
pub fn parent_index(index: u64) -> u64 {
    index >> 3
}

/// Index of the child `ordinal` (in `0..8`) of `parent`.
#[inline(always)]
pub fn child_index(parent: u64, ordinal: usize) -> u64 {
    debug_assert!(ordinal < NB_CHILDREN);
    (parent << 3) + ordinal as u64
}

/// Ordinal of a cell among its siblings, the inverse of [`child_index`].
#[inline(always)]
pub fn child_position_from_parent(index: u64) -> usize {
    (index & TRIPLET_MASK) as usize
}

/// Number of cells at `level`, one past the largest index.
#[inline(always)]
pub fn upper_bound(level: usize) -> u64 {
    1u64 << (3 * level)
}
