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

#[macro_use]
extern crate log;
extern crate env_logger;
extern crate chrono;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;

#[macro_use]
mod utils;
mod version;
mod loft;
mod sensor;
mod radio;
mod storage;
mod protocol;
mod flight;
mod gateway;

use std::env;
use std::process;

use flight::FlightNode;
use gateway::{GatewayNode, StdioHost};
use radio::Radio;
use radio::loopback::LoopbackRadio;
use sensor::baro::sim::{FixedBaroProvider, SimBaroProvider};
use sensor::imu::sim::SimImuProvider;
use sensor::gnss::sim::SimGnssProvider;
use storage::NullWatchdog;
use storage::mem_flash::MemFlash;
use storage::recorder::FlightRecorder;
use storage::settings::SettingsStore;

const LOOP_FREQUENCY_HZ: u16 = 1000;

const GROUND_PRESSURE_PA: f32 = 101325.0;
const GROUND_TEMPERATURE_C: f32 = 25.0;

/// A flight node on simulated sensors and flash. A hardware build links
/// real providers behind the same seams.
fn flight_node(radio: Box<Radio>) -> FlightNode {
    let flash = MemFlash::shared(storage::mem_flash::DEFAULT_CAPACITY);

    let recorder = FlightRecorder::new(Box::new(flash.clone()), Box::new(NullWatchdog));
    let settings = SettingsStore::new(Box::new(flash));

    let mut node = FlightNode::new(radio, recorder, settings, Box::new(NullWatchdog));

    node.link_sensor(SimBaroProvider::new());
    node.link_sensor(SimImuProvider::new());
    node.link_sensor(SimGnssProvider::new());

    node
}

fn gateway_node(radio: Box<Radio>) -> GatewayNode {
    let mut node = GatewayNode::new(radio, StdioHost::new());

    node.link_sensor(FixedBaroProvider::new(GROUND_PRESSURE_PA, GROUND_TEMPERATURE_C));

    node
}

fn main() {
    env_logger::init().unwrap();

    let mode = env::args().nth(1).unwrap_or_else(|| "sim".to_string());

    info!("{} starting", version::banner(&mode));

    match mode.as_str() {
        "flight" => {
            let mut node = flight_node(Box::new(LoopbackRadio::lone()));
            loft::run(&mut [&mut node as &mut loft::Node], LOOP_FREQUENCY_HZ);
        }

        "gateway" => {
            let mut node = gateway_node(Box::new(LoopbackRadio::lone()));
            loft::run(&mut [&mut node as &mut loft::Node], LOOP_FREQUENCY_HZ);
        }

        "sim" => {
            // both nodes in one loop, radios wired back to back
            let (air, ground) = LoopbackRadio::pair();
            let mut fc = flight_node(Box::new(air));
            let mut gw = gateway_node(Box::new(ground));

            loft::run(&mut [&mut fc as &mut loft::Node, &mut gw], LOOP_FREQUENCY_HZ);
        }

        other => {
            eprintln!("usage: loft [flight|gateway|sim] (got {:?})", other);
            process::exit(1);
        }
    }
}
