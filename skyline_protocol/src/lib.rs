// skyline_protocol: what the simulation server says to the Skyline mirror.
//
// The server runs the economic and epidemiological model; the mirror only
// listens. This crate defines the vocabulary of that one-way conversation and
// has no dependency on the sim crate, so tooling that merely records or
// filters event logs can use it alone.
//
// Module overview:
// - `types.rs`:   Server-assigned ids (`WireId`, `BuildingId`, `TenantId`,
//                 `PersonId`), integer or string on the wire.
// - `framing.rs`: `<channel>:<json>` line framing (`decode_line`,
//                 `FrameReader`).
// - `message.rs`: `InboundMessage` and the per-channel payload structs.
//
// Design decisions:
// - **JSON payloads.** The server already emits JSON through its logging
//   handler; the mirror consumes it as-is.
// - **Unknown channels are not errors.** The server grows channels faster
//   than clients update. Only a malformed payload on a known channel is
//   reported, and even that is the caller's to drop.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{Frame, FrameError, FrameReader, MAX_LINE_SIZE, decode_line};
pub use message::{
    BuildingEvent, BuildingRecord, BuildingsPayload, DecodeError, EmploymentFlag, GraphPayload,
    InboundMessage, PersonEvent, PersonPayload, PersonRecord, Sample, SampleBatch, SetupPayload,
    TenantRecord,
};
pub use types::{BuildingId, PersonId, TenantId, WireId};
