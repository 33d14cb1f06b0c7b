//! # Thermo DAQ Core Library
//!
//! This crate is the core library of the `thermo_daq` application: a
//! four-channel temperature data logger for a Fluke 1529 thermometer readout
//! on a serial line. It ingests measurement frames, converts raw resistance
//! or thermocouple EMF readings into calibrated temperatures, keeps bounded
//! rolling windows of recent samples for display consumers, and persists
//! every sample into batched, crash-tolerant daily CSV logs. Organizing the
//! project as a library keeps the pipeline reusable from different frontends:
//! the bundled CLI (`main.rs`) today, a plotting UI tomorrow.
//!
//! ## Crate Structure
//!
//! - **`app`**: The `LoggerApp` orchestrator — session state machine, queue
//!   wiring, and the snapshot/command API consumed by rendering layers.
//! - **`config`**: Typed `Settings` loaded from TOML files under `config/`.
//! - **`convert`**: The two pure conversion models — inverse
//!   Callendar–Van Dusen for platinum resistance thermometers and segmented
//!   polynomial linearization for Type-S thermocouples.
//! - **`core`**: Shared vocabulary — channels, tagged measurements, frames,
//!   converted samples, reader events, and outbound instrument commands.
//! - **`data`**: Retention and persistence — per-channel ring-buffered
//!   series, the persistence batcher, and the daily CSV log writer.
//! - **`error`**: The central `DaqError` enum for all failure classes.
//! - **`instrument`**: The serial transport seam, the Fluke 1529 frame
//!   reader, and an in-memory mock instrument.

pub mod app;
pub mod config;
pub mod convert;
pub mod core;
pub mod data;
pub mod error;
pub mod instrument;
