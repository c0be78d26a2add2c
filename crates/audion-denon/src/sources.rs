// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of AudION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Input-source name map: wire codes to the human-readable names items
//! carry, and back.

const SOURCES: &[(&str, &str)] = &[
    ("MPLAY", "Media Player"),
    ("SAT/CBL", "Satellite/Cable"),
    ("GAME", "Game"),
    ("BD", "Blu-ray Player"),
    ("PHONO", "Phonograph"),
    ("TV", "TV"),
    ("DVD", "DVD"),
    ("CD", "CD"),
    ("DVR", "DVR"),
];

/// Wire code for a human-readable source name
pub fn to_wire(name: &str) -> Option<&'static str> {
    SOURCES
        .iter()
        .find(|(_, display)| *display == name)
        .map(|(code, _)| *code)
}

/// Human-readable name for a wire source code
pub fn from_wire(code: &str) -> Option<&'static str> {
    SOURCES
        .iter()
        .find(|(wire, _)| *wire == code)
        .map(|(_, display)| *display)
}

/// All source names a `str` item may carry for the input attribute
pub fn display_names() -> impl Iterator<Item = &'static str> {
    SOURCES.iter().map(|(_, display)| *display)
}
