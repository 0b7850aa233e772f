/// CLUSTER NODES parsing
///
/// One line per node, space separated:
/// `<id> <ip:port@cport> <flags> <master> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> ...`
/// Slot fields start at index 8. Any malformed field rejects the whole
/// description.
use super::SLOT_COUNT;
use crate::core::Endpoint;
use crate::error::TopologyError;

const SLOTS_FIELD: usize = 8;
const IMPORTING_MARKER: &str = "-<-";
const MIGRATING_MARKER: &str = "->-";

/// Inclusive range of hash slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn size(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

/// One node as described by a CLUSTER NODES line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub node_id: String,
    pub endpoint: Endpoint,
    pub flags: Vec<String>,
    pub master_id: Option<String>,
    pub link_state: String,
    /// Slots this node serves
    pub slots: Vec<SlotRange>,
    /// Slots being imported, with the id of the source node
    pub importing: Vec<(u16, String)>,
    /// Slots being migrated away, with the id of the destination node
    pub migrating: Vec<(u16, String)>,
}

impl ClusterNode {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn is_master(&self) -> bool {
        self.has_flag("master")
    }

    /// Failed or address-less nodes can't serve slots
    pub fn is_serving(&self) -> bool {
        !(self.has_flag("fail") || self.has_flag("noaddr") || self.has_flag("handshake"))
    }

    /// Every slot this node serves, in order
    pub fn available_slots(&self) -> Vec<u16> {
        self.slots.iter().flat_map(|range| range.iter()).collect()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.iter().map(SlotRange::size).sum()
    }
}

/// Parse a full CLUSTER NODES reply. `reporter` is the endpoint the reply
/// came from; it stands in for nodes that don't know their own address and
/// lends its credential to every node.
pub fn parse_cluster_nodes(text: &str, reporter: &Endpoint) -> Result<Vec<ClusterNode>, TopologyError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| parse_node_line(line, index + 1, reporter))
        .collect()
}

pub fn parse_node_line(line: &str, line_no: usize, reporter: &Endpoint) -> Result<ClusterNode, TopologyError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < SLOTS_FIELD {
        return Err(TopologyError::TooFewFields {
            line: line_no,
            fields: fields.len(),
        });
    }

    let endpoint = parse_address(fields[1], line_no, reporter)?;
    let master_id = match fields[3] {
        "-" => None,
        id => Some(id.to_string()),
    };

    let mut node = ClusterNode {
        node_id: fields[0].to_string(),
        endpoint,
        flags: fields[2].split(',').map(str::to_string).collect(),
        master_id,
        link_state: fields[7].to_string(),
        slots: Vec::new(),
        importing: Vec::new(),
        migrating: Vec::new(),
    };

    for descriptor in &fields[SLOTS_FIELD..] {
        parse_slot_descriptor(descriptor, line_no, &mut node)?;
    }
    Ok(node)
}

fn parse_address(field: &str, line_no: usize, reporter: &Endpoint) -> Result<Endpoint, TopologyError> {
    let invalid = || TopologyError::InvalidAddress {
        line: line_no,
        address: field.to_string(),
    };

    // ip:port@cport[,hostname]
    let address = field.split(['@', ',']).next().unwrap_or_default();
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let port = if port.is_empty() {
        0
    } else {
        port.parse::<u16>().map_err(|_| invalid())?
    };

    let endpoint = if host.is_empty() {
        let port = if port == 0 { reporter.port() } else { port };
        Endpoint::new(reporter.host(), port)
    } else {
        Endpoint::new(host, port)
    };

    Ok(match reporter.password() {
        Some(password) => endpoint.with_password(password),
        None => endpoint,
    })
}

fn parse_slot_descriptor(descriptor: &str, line_no: usize, node: &mut ClusterNode) -> Result<(), TopologyError> {
    let invalid = || TopologyError::InvalidSlot {
        line: line_no,
        descriptor: descriptor.to_string(),
    };
    let slot = |s: &str| -> Result<u16, TopologyError> {
        match btoi::btou::<u16>(s.as_bytes()) {
            Ok(slot) if usize::from(slot) < SLOT_COUNT => Ok(slot),
            _ => Err(invalid()),
        }
    };

    if let Some(transition) = descriptor.strip_prefix('[') {
        let transition = transition.strip_suffix(']').ok_or_else(|| invalid())?;
        if let Some((s, source)) = transition.split_once(IMPORTING_MARKER) {
            if source.is_empty() {
                return Err(invalid());
            }
            node.importing.push((slot(s)?, source.to_string()));
        } else if let Some((s, destination)) = transition.split_once(MIGRATING_MARKER) {
            if destination.is_empty() {
                return Err(invalid());
            }
            node.migrating.push((slot(s)?, destination.to_string()));
        } else {
            return Err(invalid());
        }
        return Ok(());
    }

    let range = match descriptor.split_once('-') {
        Some((start, end)) => SlotRange::new(slot(start)?, slot(end)?),
        None => {
            let single = slot(descriptor)?;
            SlotRange::new(single, single)
        }
    };
    if range.start > range.end {
        return Err(invalid());
    }
    node.slots.push(range);
    Ok(())
}
