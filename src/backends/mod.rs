// SPDX-License-Identifier: GPL-3.0-only

//! Hardware backend layer
//!
//! # Modules
//!
//! - [`sensor`]: depth sensor discovery, stream lifecycle and frame delivery

pub mod sensor;
