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

//! In-process radio pair: whatever one end transmits shows up in the
//! other end's receive queue. Carries a configurable RSSI/SNR so signal
//! quality paths can be exercised without RF.

use super::*;
use std::rc::Rc;
use std::cell::RefCell;
use std::collections::VecDeque;

type FrameQueue = Rc<RefCell<VecDeque<Vec<u8>>>>;

const PENDING_LIMIT: usize = 64;

pub struct LoopbackRadio {
    inbox: FrameQueue,
    peer_inbox: FrameQueue,
    rssi: i16,
    snr: i8,
}

impl LoopbackRadio {
    /// Two radios wired back to back.
    pub fn pair() -> (LoopbackRadio, LoopbackRadio) {
        let a = Rc::new(RefCell::new(VecDeque::new()));
        let b = Rc::new(RefCell::new(VecDeque::new()));

        (
            LoopbackRadio {
                inbox: a.clone(),
                peer_inbox: b.clone(),
                rssi: -60,
                snr: 9,
            },
            LoopbackRadio {
                inbox: b,
                peer_inbox: a,
                rssi: -60,
                snr: 9,
            },
        )
    }

    /// A radio with nobody on the other end; transmissions vanish.
    pub fn lone() -> LoopbackRadio {
        let (radio, _) = LoopbackRadio::pair();
        radio
    }

    /// Signal quality this end reports for every reception.
    pub fn set_signal(&mut self, rssi: i16, snr: i8) {
        self.rssi = rssi;
        self.snr = snr;
    }
}

impl Radio for LoopbackRadio {
    fn send_blocking(&mut self, data: &[u8], _timeout_ms: u32) -> bool {
        if data.is_empty() || data.len() > MAX_PACKET_LEN {
            return false;
        }

        let mut inbox = self.peer_inbox.borrow_mut();
        if inbox.len() >= PENDING_LIMIT {
            // nobody is draining the other end; oldest frame is lost
            inbox.pop_front();
        }
        inbox.push_back(data.to_vec());
        true
    }

    fn receive(&mut self) -> Option<RxFrame> {
        self.inbox.borrow_mut().pop_front().map(|payload| {
            RxFrame {
                payload,
                rssi: self.rssi,
                snr: self.snr,
            }
        })
    }

    fn start_receive(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivery() {
        let (mut a, mut b) = LoopbackRadio::pair();
        b.set_signal(-92, 5);

        assert!(a.send_blocking(&[1, 2, 3], 100));
        assert_eq!(a.receive(), None);

        let frame = b.receive().unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3]);
        assert_eq!(frame.rssi, -92);
        assert_eq!(frame.snr, 5);
        assert_eq!(b.receive(), None);
    }

    #[test]
    fn test_rejects_bad_lengths(){
        let (mut a, _b) = LoopbackRadio::pair();

        assert!(!a.send_blocking(&[], 100));
        assert!(!a.send_blocking(&[0; 256], 100));
    }

    #[test]
    fn test_lone_radio() {
        let mut r = LoopbackRadio::lone();
        assert!(r.send_blocking(&[9], 100));
        assert_eq!(r.receive(), None);
    }
}
