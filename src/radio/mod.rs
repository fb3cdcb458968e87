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

pub mod loopback;

// PHY profile both ends must share. A driver for a real transceiver is
// expected to apply these before the node loop starts.
pub const LORA_FREQUENCY_HZ: u32 = 915_000_000;
pub const LORA_SPREADING_FACTOR: u8 = 7;
pub const LORA_BANDWIDTH_HZ: u32 = 125_000;
pub const LORA_CODING_RATE_DENOM: u8 = 5; // 4/5
pub const LORA_PREAMBLE_SYMBOLS: u8 = 8;
pub const LORA_TX_POWER_DBM: i8 = 20;
pub const LORA_SYNC_WORD: u8 = 0x14;

/// Largest payload the transceiver FIFO can carry.
pub const MAX_PACKET_LEN: usize = 255;

/// One received packet with the signal quality the transceiver measured
/// on that reception.
#[derive(PartialEq, Debug, Clone)]
pub struct RxFrame {
    pub payload: Vec<u8>,
    pub rssi: i16,
    pub snr: i8,
}

/// Half-duplex packet radio, RX-by-default. The radio is a
/// single-ownership resource touched only from the node loop; every
/// operation must leave the hardware in continuous-receive mode.
///
/// Implementations execute the transmit inside their own critical
/// section — interrupts disabled for the duration of `send_blocking`
/// and restored on every exit path — the same pattern the flash medium
/// follows for erase/program.
pub trait Radio {
    /// Transmit and wait for completion, bounded by `timeout_ms`.
    /// Returns false on timeout or if the frame was rejected.
    fn send_blocking(&mut self, data: &[u8], timeout_ms: u32) -> bool;

    /// Take one pending packet, if any. Frames failing the transceiver's
    /// payload CRC are dropped by the driver and never surface here.
    fn receive(&mut self) -> Option<RxFrame>;

    /// Re-enter continuous receive.
    fn start_receive(&mut self);
}
