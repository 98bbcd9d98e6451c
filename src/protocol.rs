use crate::inbox::{Inbound, Inbox};
use crate::mirror::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum Operation {
    #[serde(rename = "create")]
    Create(NodeId, String),
    #[serde(rename = "createText")]
    CreateText(NodeId, String),
    #[serde(rename = "setText")]
    SetText(NodeId, String),
    #[serde(rename = "setElementText")]
    SetElementText(NodeId, String),
    #[serde(rename = "appendChild")]
    AppendChild(NodeId, NodeId),
    #[serde(rename = "insertBefore")]
    InsertBefore(NodeId, NodeId, NodeId),
    /// Host removal is parent-agnostic, so only the child travels.
    #[serde(rename = "removeChild")]
    RemoveChild(#[serde(with = "single_arg")] NodeId),
    #[serde(rename = "updateProp")]
    UpdateProp(NodeId, String, Value),
    #[serde(rename = "updateStyle")]
    UpdateStyle(NodeId, serde_json::Map<String, Value>),
    #[serde(rename = "addEventListener")]
    AddEventListener(NodeId, String),
    #[serde(rename = "removeEventListener")]
    RemoveEventListener(NodeId, String),
    #[serde(rename = "invokeNativeModule")]
    InvokeNativeModule(String, String, Value, u64),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create(..) => "create",
            Operation::CreateText(..) => "createText",
            Operation::SetText(..) => "setText",
            Operation::SetElementText(..) => "setElementText",
            Operation::AppendChild(..) => "appendChild",
            Operation::InsertBefore(..) => "insertBefore",
            Operation::RemoveChild(..) => "removeChild",
            Operation::UpdateProp(..) => "updateProp",
            Operation::UpdateStyle(..) => "updateStyle",
            Operation::AddEventListener(..) => "addEventListener",
            Operation::RemoveEventListener(..) => "removeEventListener",
            Operation::InvokeNativeModule(..) => "invokeNativeModule",
        }
    }
}

/// Keeps one-argument records positional: `"args": [id]`, not `"args": id`.
mod single_arg {
    use crate::mirror::NodeId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(id: &NodeId, serializer: S) -> Result<S::Ok, S::Error> {
        [*id].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeId, D::Error> {
        let [id] = <[NodeId; 1]>::deserialize(deserializer)?;
        Ok(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum HostEnvelope {
    #[serde(rename = "resolve")]
    Resolve {
        callback_id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },

    #[serde(rename = "event")]
    NodeEvent {
        node_id: NodeId,
        event: String,
        #[serde(default)]
        payload: Value,
    },

    #[serde(rename = "global")]
    GlobalEvent {
        event: String,
        #[serde(default)]
        payload: String,
    },
}

impl From<HostEnvelope> for Inbound {
    fn from(envelope: HostEnvelope) -> Self {
        match envelope {
            HostEnvelope::Resolve {
                callback_id,
                result,
                error,
            } => Inbound::Resolve {
                callback_id,
                result,
                error,
            },
            HostEnvelope::NodeEvent {
                node_id,
                event,
                payload,
            } => Inbound::NodeEvent {
                node_id,
                event,
                payload,
            },
            HostEnvelope::GlobalEvent { event, payload } => Inbound::GlobalEvent { event, payload },
        }
    }
}

pub fn encode_operations(ops: &[Operation]) -> Result<String, serde_json::Error> {
    serde_json::to_string(ops)
}

pub fn decode_operations(payload: &str) -> Result<Vec<Operation>, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Reads framed host envelopes until EOF and forwards each into the bridge
/// inbox. Frames that do not decode are skipped; framing and IO errors end
/// the loop.
pub fn reader_loop(reader: &mut impl Read, inbox: &Inbox, max_payload: usize) -> io::Result<()> {
    loop {
        match read_frame(reader, max_payload) {
            Ok(payload) => {
                let envelope = match decode_host_envelope(&payload) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            bytes = payload.len(),
                            "skipping undecodable host frame"
                        );
                        continue;
                    }
                };
                if inbox.send(envelope.into()).is_err() {
                    tracing::warn!("bridge inbox closed; stopping reader loop");
                    return Ok(());
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

pub fn spawn_reader<R>(mut reader: R, inbox: Inbox, max_payload: usize) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let result = reader_loop(&mut reader, &inbox, max_payload);
        if let Err(err) = &result {
            tracing::error!(error = %err, "host reader loop terminated with error");
        }
        result
    })
}

fn decode_host_envelope(payload: &[u8]) -> io::Result<HostEnvelope> {
    serde_json::from_slice(payload).map_err(json_error)
}

pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", payload.len(), max_payload),
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
