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

//! Ground gateway node: bridges the radio link to the line-oriented
//! host protocol. For every accepted telemetry frame the decoded text
//! line reaches the host before the ACK goes on air.

pub mod protocol;

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{channel, Receiver};
use std::thread::spawn;

use loft::Node;
use loft::handle::{BasicHandle, Handle, PushableHandle};
use radio::Radio;
use sensor::{Sensor, SensorData};
use self::protocol::{GatewayProtocol, HostAction};

const ACK_TX_TIMEOUT_MS: u32 = 100;
const COMMAND_TX_TIMEOUT_MS: u32 = 500;

/// Line-oriented host connection. The process's stdio is the reference
/// transport, matching the USB CDC link of the hardware gateway.
pub trait HostPort {
    fn poll_line(&mut self) -> Option<String>;
    fn write_line(&mut self, line: &str);
}

pub struct StdioHost {
    rx: Receiver<String>,
    stdout: io::Stdout,
}

impl StdioHost {
    pub fn new() -> Box<HostPort> {
        let (tx, rx) = channel();

        // stdin reads block, so a reader thread feeds the loop
        spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Box::new(StdioHost {
            rx,
            stdout: io::stdout(),
        })
    }
}

impl HostPort for StdioHost {
    fn poll_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    fn write_line(&mut self, line: &str) {
        // a wedged host must not stall the radio loop; drop on error
        let _ = writeln!(self.stdout, "{}", line);
        let _ = self.stdout.flush();
    }
}

pub struct GatewayNode {
    radio: Box<Radio>,
    sensors: Vec<Box<Sensor>>,
    queue: VecDeque<SensorData>,
    protocol: GatewayProtocol,
    host: Box<HostPort>,
}

impl GatewayNode {
    pub fn new(radio: Box<Radio>, mut host: Box<HostPort>) -> GatewayNode {
        let protocol = GatewayProtocol::new();

        host.write_line(&protocol.link_status_line("usb_connected"));

        GatewayNode {
            radio,
            sensors: vec![],
            queue: VecDeque::new(),
            protocol,
            host,
        }
    }

    pub fn link_sensor(&mut self, s: Box<Sensor>) {
        self.sensors.push(s);
    }

    fn process_radio(&mut self, now_ms: u32) {
        let frame = match self.radio.receive() {
            Some(f) => f,
            None => return,
        };

        let result = self.protocol.on_radio_frame(&frame.payload, frame.rssi, frame.snr, now_ms);

        // text first, ACK second
        for line in &result.lines {
            self.host.write_line(line);
        }

        if let Some(ack) = result.ack {
            if self.radio.send_blocking(&ack, ACK_TX_TIMEOUT_MS) {
                self.protocol.mark_sent();
            } else {
                debug!("gateway: ACK TX failed");
            }
        }

        self.radio.start_receive();
    }

    fn read_ground_barometer(&mut self, h: &mut BasicHandle) {
        {
            let mut handle = PushableHandle::new(h, &mut self.queue);

            for s in self.sensors.iter_mut() {
                s.run(&mut handle);
            }
        }

        while let Some(data) = self.queue.pop_front() {
            if let SensorData::Baro(sample) = data {
                self.protocol.set_ground_baro(&sample);
            }
        }
    }

    fn process_host(&mut self) {
        let line = match self.host.poll_line() {
            Some(l) => l,
            None => return,
        };

        match self.protocol.on_host_line(&line) {
            HostAction::Reply(lines) => {
                for l in &lines {
                    self.host.write_line(l);
                }
            }
            HostAction::Forward { id, packet } => {
                let sent = self.radio.send_blocking(&packet, COMMAND_TX_TIMEOUT_MS);
                if sent {
                    self.protocol.mark_sent();
                }

                // acknowledgement follows the TX attempt, success or not
                let ack = self.protocol.ack_line(id, sent);
                self.host.write_line(&ack);

                self.radio.start_receive();
            }
            HostAction::Ignore => {}
        }
    }
}

impl Node for GatewayNode {
    fn step(&mut self, h: &mut BasicHandle) {
        let now_ms = h.get_millis();

        self.process_radio(now_ms);
        self.read_ground_barometer(h);
        self.process_host();

        if let Some(line) = self.protocol.supervise(now_ms) {
            self.host.write_line(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::cell::RefCell;
    use radio::loopback::LoopbackRadio;
    use protocol::{PACKET_MAGIC, PACKET_ACK, PACKET_COMMAND, CMD_ARM, BROADCAST_ROCKET_ID};
    use protocol::telemetry::TelemetryPacket;

    /// Scripted host port: queued input lines, captured output.
    struct TestHost {
        input: Rc<RefCell<VecDeque<String>>>,
        output: Rc<RefCell<Vec<String>>>,
    }

    fn test_host() -> (Box<HostPort>, Rc<RefCell<VecDeque<String>>>, Rc<RefCell<Vec<String>>>) {
        let input = Rc::new(RefCell::new(VecDeque::new()));
        let output = Rc::new(RefCell::new(Vec::new()));

        let host = TestHost {
            input: input.clone(),
            output: output.clone(),
        };

        (Box::new(host), input, output)
    }

    impl HostPort for TestHost {
        fn poll_line(&mut self) -> Option<String> {
            self.input.borrow_mut().pop_front()
        }

        fn write_line(&mut self, line: &str) {
            self.output.borrow_mut().push(line.to_string());
        }
    }

    fn telemetry_frame() -> Vec<u8> {
        let mut p = TelemetryPacket::default();
        p.sequence = 1;
        p.pressure_pa = 101000;
        p.encode().to_vec()
    }

    #[test]
    fn test_usb_connected_on_startup() {
        let (host, _input, output) = test_host();
        let _node = GatewayNode::new(Box::new(LoopbackRadio::lone()), host);

        assert_eq!(
            output.borrow()[0],
            "{\"type\":\"link\",\"status\":\"usb_connected\"}"
        );
    }

    #[test]
    fn test_telemetry_line_precedes_ack() {
        let (gw_radio, mut fc_radio) = LoopbackRadio::pair();
        let (host, _input, output) = test_host();
        let mut node = GatewayNode::new(Box::new(gw_radio), host);

        fc_radio.send_blocking(&telemetry_frame(), 100);

        let mut h = BasicHandle::at(1000, 1000);
        node.step(&mut h);

        {
            let out = output.borrow();
            // startup record, link-up record, then the telemetry line
            assert_eq!(out.len(), 3);
            assert!(out[1].contains("\"status\":\"connected\""));
            assert!(out[2].starts_with("{\"type\":\"tel\""));
        }

        // the ACK went on air after the lines were written
        let ack = fc_radio.receive().expect("ACK frame");
        assert_eq!(ack.payload[1], PACKET_ACK);
    }

    #[test]
    fn test_host_command_round_trip() {
        let (gw_radio, mut fc_radio) = LoopbackRadio::pair();
        let (host, input, output) = test_host();
        let mut node = GatewayNode::new(Box::new(gw_radio), host);

        input.borrow_mut().push_back("{\"cmd\":\"arm\",\"id\":21}".to_string());

        let mut h = BasicHandle::at(1000, 1000);
        node.step(&mut h);

        let frame = fc_radio.receive().expect("forwarded command");
        assert_eq!(
            frame.payload,
            vec![PACKET_MAGIC, PACKET_COMMAND, BROADCAST_ROCKET_ID, CMD_ARM]
        );

        let out = output.borrow();
        assert_eq!(out.last().unwrap(), "{\"type\":\"ack\",\"id\":21,\"ok\":true}");
    }

    #[test]
    fn test_ping_answered_without_radio_traffic() {
        let (gw_radio, mut fc_radio) = LoopbackRadio::pair();
        let (host, input, output) = test_host();
        let mut node = GatewayNode::new(Box::new(gw_radio), host);

        input.borrow_mut().push_back("{\"cmd\":\"ping\",\"id\":7}".to_string());

        let mut h = BasicHandle::at(1000, 1000);
        node.step(&mut h);

        assert_eq!(fc_radio.receive(), None); // nothing transmitted

        let out = output.borrow();
        assert_eq!(out.last().unwrap(), "{\"type\":\"ack\",\"id\":7,\"ok\":true}");
    }

    #[test]
    fn test_link_lost_line() {
        let (gw_radio, mut fc_radio) = LoopbackRadio::pair();
        let (host, _input, output) = test_host();
        let mut node = GatewayNode::new(Box::new(gw_radio), host);

        fc_radio.send_blocking(&telemetry_frame(), 100);
        let mut h = BasicHandle::at(1000, 1000);
        node.step(&mut h);

        // silence past the timeout
        let mut h = BasicHandle::at(6001, 1000);
        node.step(&mut h);

        let out = output.borrow();
        assert_eq!(out.last().unwrap(), "{\"type\":\"link\",\"status\":\"lost\"}");
    }
}
