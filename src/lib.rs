//! Control core for digital switch-mode power converters.
//!
//! Hardware-independent decision logic for a multi-phase buck or boost regulator:
//!
//! - [`converter::Converter`]: startup/shutdown state machine driving one voltage loop and
//!   one current loop per phase,
//! - [`compensator`]: fixed-point n-pole/n-zero compensators behind the [`Compensator`] trait,
//! - [`fault`]: debounced protection monitors with trip/release hysteresis,
//! - [`calibration`]: current-sense offset calibration and phase current balancing,
//! - [`power_supply::PowerSupply`]: the slow-tick supervisor running all of the above.
//!
//! PWM and ADC access stay outside the crate behind [`PowerStage`] and the
//! `embedded-hal` digital pin traits. Enable the `defmt` or `log` feature for logging.

#![no_std]

#[macro_use]
pub(crate) mod fmt;

pub mod calibration;
pub mod compensator;
pub mod config;
pub mod converter;
pub mod data_types;
pub mod error;
pub mod fault;
pub mod power_supply;
pub mod q15;
pub mod startup;
pub mod status_word;

pub use compensator::{Compensator, Npnz, Npnz1p1z, Npnz2p2z, Npnz3p3z};
pub use config::ConverterConfig;
pub use converter::{Converter, ConverterPins, NoPin, PowerStage};
pub use data_types::{ControlMode, ConverterMode, Samples, Topology};
pub use error::{ConfigError, Error};
pub use power_supply::PowerSupply;
