//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备驱动

pub mod loopback;
pub mod space;

pub use loopback::Loopback;
pub use space::{Clock, DeviceStats, NetDevice, StepClock};
