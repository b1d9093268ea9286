// Typed inbound messages.
//
// Four channels drive the mirror:
// - `setup`:     full-state bootstrap (population + building ids).
// - `buildings`: a tenant moved into or out of a building.
// - `person`:    a resident's employment changed, or the resident died.
// - `graph`:     new samples for one named chart.
//
// Any other channel (`twooter`, `simulation`, ...) belongs to UI layers the
// mirror does not model; `InboundMessage::decode` returns `Ok(None)` for
// them. A known channel with a payload that does not match its schema is a
// `DecodeError`, and callers are expected to drop the event rather than stop.
//
// Payload structs ignore unknown fields (the server adds fields such as
// `wage` on `hired` that the mirror has no use for).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::framing::Frame;
use crate::types::{BuildingId, PersonId, TenantId};

pub const SETUP_CHANNEL: &str = "setup";
pub const BUILDINGS_CHANNEL: &str = "buildings";
pub const PERSON_CHANNEL: &str = "person";
pub const GRAPH_CHANNEL: &str = "graph";

/// A decoded event from the simulation server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InboundMessage {
    Setup(SetupPayload),
    Buildings(BuildingsPayload),
    Person(PersonPayload),
    Graph(GraphPayload),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed `{channel}` payload: {source}")]
    Malformed {
        channel: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl InboundMessage {
    /// Decode a frame. Unknown channels yield `Ok(None)`.
    pub fn decode(frame: &Frame) -> Result<Option<Self>, DecodeError> {
        fn parse<T: for<'de> Deserialize<'de>>(
            channel: &'static str,
            payload: &str,
        ) -> Result<T, DecodeError> {
            serde_json::from_str(payload).map_err(|source| DecodeError::Malformed { channel, source })
        }

        let message = match frame.channel.as_str() {
            SETUP_CHANNEL => Self::Setup(parse(SETUP_CHANNEL, &frame.payload)?),
            BUILDINGS_CHANNEL => Self::Buildings(parse(BUILDINGS_CHANNEL, &frame.payload)?),
            PERSON_CHANNEL => Self::Person(parse(PERSON_CHANNEL, &frame.payload)?),
            GRAPH_CHANNEL => Self::Graph(parse(GRAPH_CHANNEL, &frame.payload)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// The channel this message travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Setup(_) => SETUP_CHANNEL,
            Self::Buildings(_) => BUILDINGS_CHANNEL,
            Self::Person(_) => PERSON_CHANNEL,
            Self::Graph(_) => GRAPH_CHANNEL,
        }
    }

    /// Encode back into a wire frame.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        let payload = match self {
            Self::Setup(p) => serde_json::to_string(p)?,
            Self::Buildings(p) => serde_json::to_string(p)?,
            Self::Person(p) => serde_json::to_string(p)?,
            Self::Graph(p) => serde_json::to_string(p)?,
        };
        Ok(Frame::new(self.channel(), payload))
    }
}

// ---------------------------------------------------------------------------
// setup
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupPayload {
    #[serde(default)]
    pub population: Vec<PersonRecord>,
    #[serde(default)]
    pub buildings: Vec<BuildingRecord>,
}

/// A resident as described at bootstrap. Only the attributes that drive the
/// resident's appearance and initial status are kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    #[serde(default)]
    pub race: u32,
    #[serde(default)]
    pub employed: EmploymentFlag,
    #[serde(default)]
    pub firm_owner: bool,
}

/// Employment as reported by the server: either a boolean or a census
/// employment code, where code 1 means gainfully employed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmploymentFlag {
    Flag(bool),
    Code(i64),
}

impl Default for EmploymentFlag {
    fn default() -> Self {
        EmploymentFlag::Flag(false)
    }
}

impl EmploymentFlag {
    pub fn is_employed(self) -> bool {
        match self {
            EmploymentFlag::Flag(b) => b,
            EmploymentFlag::Code(code) => code == 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub id: BuildingId,
}

// ---------------------------------------------------------------------------
// buildings
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingsPayload {
    pub id: BuildingId,
    pub event: BuildingEvent,
    pub tenant: TenantRecord,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingEvent {
    AddedTenant,
    RemovedTenant,
}

/// Tenant reference. Removals carry only the id; additions also carry the
/// server-side type name (e.g. `Hospital`, `ConsumerGoodFirm`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

// ---------------------------------------------------------------------------
// person
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonPayload {
    pub id: PersonId,
    pub event: PersonEvent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonEvent {
    Fired,
    Hired,
    StartedFirm,
    Died,
}

// ---------------------------------------------------------------------------
// graph
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub graph: String,
    pub data: SampleBatch,
}

/// One chart sample. `time` is milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: i64,
    pub value: f64,
}

/// The server sends either a single sample or a list of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleBatch {
    One(Sample),
    Many(Vec<Sample>),
}

impl SampleBatch {
    pub fn into_vec(self) -> Vec<Sample> {
        match self {
            SampleBatch::One(s) => vec![s],
            SampleBatch::Many(v) => v,
        }
    }

    pub fn as_slice(&self) -> &[Sample] {
        match self {
            SampleBatch::One(s) => std::slice::from_ref(s),
            SampleBatch::Many(v) => v,
        }
    }
}
