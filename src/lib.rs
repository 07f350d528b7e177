//! Interrupt-driven driver stack for DMX512 (ANSI E1.11) and DMX-RDM
//! (ANSI E1.20) over an RS485 bus. The crate owns one or more UART ports
//! through a small HAL façade and exposes a send/receive frame interface
//! together with an RDM responder and controller, including the binary
//! search discovery algorithm. It features no-std as well as no-alloc
//! support (no heap allocation) to target embedded as well as os
//! platforms.
//!
//! Please refer to the [official specifications](https://tsp.esta.org/)
//! published by the ESTA.
//!
//! # Usage
//!
//! Platform glue implements the [`hal`] traits for a UART, a hardware
//! timer and a wakeup primitive, forwards the interrupts to the port's
//! ISR entry points and installs the driver.
//!
//! ## Controller
//!
//! ```ignore
//! use dmx_rdm_port::dmx_controller::{DmxController, DmxControllerConfig};
//! use dmx_rdm_port::port::{DmxPort, PortConfig};
//! use dmx_rdm_port::unique_identifier::{PackageAddress, UniqueIdentifier};
//! use dmx_rdm_port::utils::discover_devices;
//!
//! let port = DmxPort::<Board>::install(0, &PortConfig::default(), uart, timer, signal, nvs)?;
//! let mut controller = DmxController::new(port, &DmxControllerConfig::default());
//!
//! // Unmute all responders, then walk the bus.
//! controller.rdm_disc_un_mute(PackageAddress::Broadcast)?;
//! let mut devices = [UniqueIdentifier::new(1, 1).unwrap(); 32];
//! let found = discover_devices(&mut controller, &mut devices)?;
//!
//! for device in &devices[..found] {
//!     controller.rdm_set_identify(PackageAddress::Device(*device), true)?;
//! }
//! ```
//!
//! ## Responder
//!
//! ```ignore
//! use dmx_rdm_port::port::{DmxPort, PortConfig};
//! use dmx_rdm_port::responder::{DmxResponderHandler, Personality, ResponderCore};
//!
//! struct Fixture;
//!
//! impl DmxResponderHandler for Fixture {
//!     type Error = core::convert::Infallible;
//!     // Unregistered PIDs land here; the required PIDs are served by the
//!     // driver itself.
//! }
//!
//! let mut config = PortConfig::default();
//! config.device.personalities = &[Personality { footprint: 4, description: "RGBW" }];
//!
//! let mut port = DmxPort::<Board>::install(0, &config, uart, timer, signal, nvs)?;
//! let mut fixture = Fixture;
//!
//! loop {
//!     // Answers RDM requests addressed to us, hands DMX frames to the
//!     // handler.
//!     match port.poll_rdm(25_000, &mut fixture) {
//!         Ok(_) => (),
//!         Err(error) => log::warn!("'{error}' during polling"),
//!     }
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Incremental recognition of DMX frames, RDM messages and discovery
/// responses while they are still arriving.
pub mod classifier;
pub mod command_class;
pub mod consts;
/// Module for building dmx-rdm controllers.
pub mod dmx_controller;
/// Driver traits the controller builds on; implemented by [`port::DmxPort`]
/// and by mockups.
pub mod dmx_driver;
mod engine;
/// Wire serializer for parameter data described by format strings.
pub mod format;
/// The hardware façade: UART, timer, wakeup signal and non-volatile
/// storage traits.
pub mod hal;
mod layouts;
/// Bounded parameter storage: definitions, bump heap, queued messages.
pub mod parameter;
pub mod pids;
/// The per-port driver façade and its ISR entry points.
pub mod port;
pub mod rdm_data;
pub mod rdm_packages;
pub mod rdm_types;
/// Process-wide port registry and the MAC-derived device UID.
pub mod registry;
/// The RDM responder: validation, per-PID dispatch, response assembly.
pub mod responder;
/// Passive BREAK / mark-after-break measurement of third-party traffic.
pub mod sniffer;
pub mod types;
pub mod unique_identifier;
pub mod utils;
