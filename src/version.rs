// Loft - a model rocket flight computer and telemetry gateway
// Copyright (C) 2017-2018  Loft Project Developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Firmware identification, reported in the Info packet and the
//! gateway's gw_info/fc_info records.

pub const FIRMWARE_NAME: &'static str = "Loft";

pub const FIRMWARE_VERSION: &'static str = "1.4.0";

/// Bumped whenever a wire format changes incompatibly. Both ends of the
/// radio link must agree on it.
pub const PROTOCOL_VERSION: &'static str = "2.0";

/// Build identifier. A release script may rewrite this; the fallback
/// keeps packets well-formed when building straight from a checkout.
pub const BUILD_STRING: &'static str = "dev";

/// One-line identification for the startup log, e.g.
/// `Loft flight 1.4.0 (build dev, protocol 2.0)`.
pub fn banner(node_type: &str) -> String {
    format!(
        "{} {} {} (build {}, protocol {})",
        FIRMWARE_NAME,
        node_type,
        FIRMWARE_VERSION,
        BUILD_STRING,
        PROTOCOL_VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_carries_all_identification() {
        let b = banner("flight");

        assert!(b.contains(FIRMWARE_NAME));
        assert!(b.contains("flight"));
        assert!(b.contains(FIRMWARE_VERSION));
        assert!(b.contains(BUILD_STRING));
        assert!(b.contains(PROTOCOL_VERSION));
    }

    #[test]
    fn test_version_strings_fit_info_packet() {
        // the Info packet length-prefixes these with a single byte
        assert!(FIRMWARE_VERSION.len() <= 255);
        assert!(BUILD_STRING.len() <= 255);
    }
}
