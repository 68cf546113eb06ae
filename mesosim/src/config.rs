use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use itertools::Itertools;
use serde::Deserialize;

use crate::signal::{SignalActuator, SignalPhase};
use crate::{
    ActuatorId, Demand, Error, LaneGroup, LaneGroupId, Link, LinkId, Network, Node, NodeId,
    Output, OutputKind, Profile2D, Result, RoadParams, Scenario, SplitMatrixProfile, Stage,
    StageController, StochasticProcess,
};

/// Top-level scenario description, deserialized from a JSON document.
#[derive(Debug, Deserialize)]
pub struct ScenarioConfig {
    /// The network section: road parameters, nodes, links, road connections.
    pub network: NetworkConfig,
    /// Demand records bound to source links.
    #[serde(default)]
    pub demands: Vec<DemandConfig>,
    /// Split-matrix records bound to links.
    #[serde(default)]
    pub splits: Vec<SplitConfig>,
    /// Actuators keyed by external ID.
    #[serde(default)]
    pub actuators: HashMap<u64, ActuatorConfig>,
    /// Controllers keyed by external ID.
    #[serde(default)]
    pub controllers: HashMap<u64, ControllerConfig>,
    /// Output requests.
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
    /// Stochastic process name; Poisson when absent.
    #[serde(default)]
    pub process: Option<String>,
}

/// The network section of a scenario description.
#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    /// Road parameter sets keyed by external ID.
    pub roadparams: HashMap<u64, RoadParamsConfig>,
    /// Nodes keyed by external ID.
    pub nodes: HashMap<u64, NodeConfig>,
    /// Links keyed by external ID.
    pub links: HashMap<u64, LinkConfig>,
    /// Road connections keyed by external ID.
    #[serde(default)]
    pub roadconnections: HashMap<u64, RoadConnectionConfig>,
}

/// Road parameters shared by links referencing them.
#[derive(Debug, Deserialize)]
pub struct RoadParamsConfig {
    /// Capacity in vehicles per hour per lane.
    pub capacity: f64,
    /// Free-flow speed in km/h.
    pub speed: f64,
    /// Jam density in vehicles per km per lane.
    pub jam_density: f64,
}

/// A node record. Nodes carry no attributes of their own.
#[derive(Debug, Deserialize)]
pub struct NodeConfig {}

/// A link record.
#[derive(Debug, Deserialize)]
pub struct LinkConfig {
    /// Total number of lanes.
    pub full_lanes: usize,
    /// Length in meters.
    pub length: f64,
    /// External ID of the upstream node.
    pub start: u64,
    /// External ID of the downstream node.
    pub end: u64,
    /// External ID of the road parameter set.
    pub roadparam: u64,
}

/// A road connection record: which lanes of an inbound link feed an outlink.
#[derive(Debug, Deserialize)]
pub struct RoadConnectionConfig {
    /// External ID of the inbound link.
    pub in_link: u64,
    /// External ID of the outbound link.
    pub out_link: u64,
    /// Lane range on the inbound link as `"first-last"` (1-based, both
    /// inclusive); all lanes when absent.
    #[serde(default)]
    pub in_link_lanes: Option<String>,
}

/// A demand record.
#[derive(Debug, Deserialize)]
pub struct DemandConfig {
    /// External ID of the source link.
    pub link: u64,
    /// Piecewise-constant rate profile in vehicles per hour.
    pub value: Vec<f64>,
    /// Profile step in seconds.
    #[serde(default)]
    pub dt: Option<f64>,
}

/// A split-matrix record.
#[derive(Debug, Deserialize)]
pub struct SplitConfig {
    /// External ID of the link whose departures are routed.
    pub link_in: u64,
    /// Profile step in seconds; a static profile when absent.
    #[serde(default)]
    pub dt: Option<f64>,
    /// Per-outlink value rows keyed by external outlink ID.
    pub link_out_value: HashMap<u64, Vec<f64>>,
}

/// An actuator record.
#[derive(Debug, Deserialize)]
pub struct ActuatorConfig {
    /// Actuator kind; only `"signal"` is known.
    #[serde(rename = "type")]
    pub kind: String,
    /// The entity this actuator acts on.
    pub target: TargetConfig,
    /// Wake-up period; poked synchronously by its controller when absent.
    #[serde(default)]
    pub dt: Option<f64>,
    /// Signal phases, for signal actuators.
    #[serde(default)]
    pub signal: Vec<PhaseConfig>,
}

/// An actuator target record.
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Target kind; only `"node"` is known.
    #[serde(rename = "type")]
    pub kind: String,
    /// External ID of the target.
    pub id: u64,
}

/// A signal phase record.
#[derive(Debug, Deserialize)]
pub struct PhaseConfig {
    /// Phase ID referenced by controller stages.
    pub phase: usize,
    /// Road connections whose entry lane groups this phase controls.
    pub roadconnections: Vec<u64>,
}

/// A controller record.
#[derive(Debug, Deserialize)]
pub struct ControllerConfig {
    /// Controller kind; only `"sig_pretimed"` is known.
    #[serde(rename = "type")]
    pub kind: String,
    /// External IDs of the actuators this controller commands.
    pub target_actuators: Vec<u64>,
    /// Optional fixed wake-up period.
    #[serde(default)]
    pub dt: Option<f64>,
    /// Cycle length in seconds.
    #[serde(default)]
    pub cycle: Option<f64>,
    /// Cycle offset in seconds.
    #[serde(default)]
    pub offset: Option<f64>,
    /// Ordered stages.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// A stage record.
#[derive(Debug, Deserialize)]
pub struct StageConfig {
    /// Duration in seconds.
    pub duration: f64,
    /// Phases green during this stage.
    pub phases: Vec<usize>,
}

/// An output request record.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output kind, e.g. `"link_vehicles"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Sampling cadence for timed kinds.
    #[serde(default)]
    pub dt: Option<f64>,
}

/// Loads a scenario description from a JSON file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<ScenarioConfig> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// A road connection with its references resolved to arena IDs.
struct ResolvedConnection {
    ext_id: u64,
    in_link: LinkId,
    out_link: LinkId,
    lanes: (usize, usize),
}

fn parse_lane_range(range: &str) -> Result<(usize, usize)> {
    let invalid = || Error::InvalidLaneRange(range.to_string());
    let (first, last) = range.split('-').collect_tuple().ok_or_else(invalid)?;
    let first: usize = first.trim().parse().map_err(|_| invalid())?;
    let last: usize = last.trim().parse().map_err(|_| invalid())?;
    if first < 1 || last < first {
        return Err(invalid());
    }
    Ok((first, last))
}

fn unknown(entity: &'static str, id: u64) -> Error {
    Error::UnknownEntity { entity, id }
}

/// Everything derived from the network section: the arena, resolved road
/// connections, and the entry lane groups each connection feeds.
struct BuiltNetwork {
    network: Network,
    connections: Vec<ResolvedConnection>,
    connection_in_lgs: HashMap<u64, Vec<LaneGroupId>>,
    link_index: HashMap<u64, LinkId>,
    node_index: HashMap<u64, NodeId>,
}

fn build_network(config: &NetworkConfig) -> Result<BuiltNetwork> {
    let mut network = Network::default();

    // External IDs are visited in sorted order so arena indices, and with
    // them the whole run, are deterministic.
    let node_exts: Vec<u64> = config.nodes.keys().copied().sorted().collect();
    let node_index: HashMap<u64, NodeId> = node_exts
        .iter()
        .enumerate()
        .map(|(index, &ext)| (ext, NodeId::from(index)))
        .collect();
    for &ext in &node_exts {
        network.nodes.push(Node::new(ext));
    }

    let link_exts: Vec<u64> = config.links.keys().copied().sorted().collect();
    let link_index: HashMap<u64, LinkId> = link_exts
        .iter()
        .enumerate()
        .map(|(index, &ext)| (ext, LinkId::from(index)))
        .collect();
    for &ext in &link_exts {
        let link = &config.links[&ext];
        let rp = config
            .roadparams
            .get(&link.roadparam)
            .ok_or_else(|| unknown("road parameter", link.roadparam))?;
        let start = *node_index
            .get(&link.start)
            .ok_or_else(|| unknown("node", link.start))?;
        let end = *node_index
            .get(&link.end)
            .ok_or_else(|| unknown("node", link.end))?;
        let id = link_index[&ext];
        network.nodes[usize::from(start)].out_links.push(id);
        network.nodes[usize::from(end)].in_links.push(id);
        network.links.push(Link {
            ext_id: ext,
            length: link.length,
            full_lanes: link.full_lanes,
            start_node: start,
            end_node: end,
            roadparam: RoadParams {
                capacity: rp.capacity,
                speed: rp.speed,
                jam_density: rp.jam_density,
            },
            lane_groups: Vec::new(),
            outlink_to_lanegroups: HashMap::new(),
            is_source: false,
            is_sink: false,
        });
    }
    network.derive_flags();

    let connection_exts: Vec<u64> = config.roadconnections.keys().copied().sorted().collect();
    let mut connections = Vec::with_capacity(connection_exts.len());
    for &ext in &connection_exts {
        let rc = &config.roadconnections[&ext];
        let in_link = *link_index
            .get(&rc.in_link)
            .ok_or_else(|| unknown("link", rc.in_link))?;
        let out_link = *link_index
            .get(&rc.out_link)
            .ok_or_else(|| unknown("link", rc.out_link))?;
        let lanes = match &rc.in_link_lanes {
            Some(range) => parse_lane_range(range)?,
            None => (1, network.link(in_link).full_lanes),
        };
        connections.push(ResolvedConnection {
            ext_id: ext,
            in_link,
            out_link,
            lanes,
        });
    }

    // One lane group per run of lanes served by the same set of outgoing
    // road connections; a link with no connections keeps a single group.
    for index in 0..network.links.len() {
        let link_id = LinkId::from(index);
        let (length, full_lanes, rp, is_source) = {
            let link = &network.links[index];
            (link.length, link.full_lanes, link.roadparam, link.is_source)
        };
        let out_rcs: Vec<&ResolvedConnection> = connections
            .iter()
            .filter(|rc| rc.in_link == link_id)
            .collect();
        let mut groups: Vec<(usize, usize)> = Vec::new();
        if out_rcs.is_empty() {
            groups.push((1, full_lanes));
        } else {
            let lane_sets: Vec<Vec<u64>> = (1..=full_lanes)
                .map(|lane| {
                    out_rcs
                        .iter()
                        .filter(|rc| lane >= rc.lanes.0 && lane <= rc.lanes.1)
                        .map(|rc| rc.ext_id)
                        .collect()
                })
                .collect();
            let mut seen: Vec<&Vec<u64>> = Vec::new();
            for set in &lane_sets {
                if !seen.contains(&set) {
                    seen.push(set);
                }
            }
            for set in seen {
                let lanes: Vec<usize> = lane_sets
                    .iter()
                    .positions(|other| other == set)
                    .map(|position| position + 1)
                    .collect();
                groups.push((lanes[0], lanes.len()));
            }
        }
        for (start_lane, num_lanes) in groups {
            let lg_id = LaneGroupId::from(network.lane_groups.len());
            network.lane_groups.push(LaneGroup::new(
                link_id, start_lane, num_lanes, length, rp, is_source,
            ));
            network.links[index].lane_groups.push(lg_id);
        }
    }

    // Entry lane groups fed by each road connection: the in-link groups
    // whose lanes fall inside the connection's range.
    let mut connection_in_lgs: HashMap<u64, Vec<LaneGroupId>> = HashMap::new();
    for rc in &connections {
        let lgs: Vec<LaneGroupId> = network
            .link(rc.in_link)
            .lane_groups
            .iter()
            .copied()
            .filter(|&lg| {
                let lg = network.lane_group(lg);
                lg.start_lane >= rc.lanes.0 && lg.start_lane + lg.num_lanes - 1 <= rc.lanes.1
            })
            .collect();
        connection_in_lgs.insert(rc.ext_id, lgs);
    }

    // Reachability tables: which of a link's lane groups reach each outlink.
    for index in 0..network.links.len() {
        let link_id = LinkId::from(index);
        if network.links[index].is_sink {
            continue;
        }
        let exiting: Vec<(u64, LinkId)> = connections
            .iter()
            .filter(|rc| rc.in_link == link_id)
            .map(|rc| (rc.ext_id, rc.out_link))
            .collect();
        let mut table: HashMap<LinkId, Vec<LaneGroupId>> = HashMap::new();
        if exiting.is_empty() {
            let end_node = network.links[index].end_node;
            for &outlink in &network.nodes[usize::from(end_node)].out_links {
                table.insert(outlink, network.links[index].lane_groups.clone());
            }
        } else {
            for (rc_ext, out_link) in exiting {
                table
                    .entry(out_link)
                    .or_default()
                    .extend(connection_in_lgs[&rc_ext].iter().copied());
            }
            for lgs in table.values_mut() {
                lgs.sort_unstable();
                lgs.dedup();
            }
        }
        network.links[index].outlink_to_lanegroups = table;
    }

    Ok(BuiltNetwork {
        network,
        connections,
        connection_in_lgs,
        link_index,
        node_index,
    })
}

/// Builds a runnable scenario from a parsed description.
///
/// `output` names the folder and file prefix for CSV writers; it is required
/// only when the description requests outputs.
///
/// # Errors
///
/// Returns an error for unknown kinds or entity references, invalid
/// profiles, or a lane group claimed by more than one signal phase.
pub fn build_scenario(
    config: &ScenarioConfig,
    seed: Option<u64>,
    output: Option<(&Path, &str)>,
) -> Result<Scenario> {
    let process = match &config.process {
        Some(name) => name
            .parse::<StochasticProcess>()
            .map_err(|_| Error::UnknownStochasticProcess(name.clone()))?,
        None => StochasticProcess::default(),
    };

    let built = build_network(&config.network)?;
    let BuiltNetwork {
        network,
        connections,
        connection_in_lgs,
        link_index,
        node_index,
    } = built;
    let connection_exts: Vec<u64> = connections.iter().map(|rc| rc.ext_id).collect();
    let mut scenario = Scenario::new(network, process, seed);

    for demand in &config.demands {
        let link = *link_index
            .get(&demand.link)
            .ok_or_else(|| unknown("link", demand.link))?;
        scenario.add_demand(Demand::new(link, demand.value.clone(), demand.dt)?);
    }

    for split in &config.splits {
        let link_in = *link_index
            .get(&split.link_in)
            .ok_or_else(|| unknown("link", split.link_in))?;
        let mut profile = Profile2D::new(split.dt);
        for out_ext in split.link_out_value.keys().copied().sorted() {
            let out_link = *link_index
                .get(&out_ext)
                .ok_or_else(|| unknown("link", out_ext))?;
            profile.add_entry(out_link, split.link_out_value[&out_ext].clone());
        }
        let profile = SplitMatrixProfile::new(link_in, split.link_in, profile)?;
        scenario.set_split_profile(profile, split.link_in)?;
    }

    let mut actuator_index: HashMap<u64, ActuatorId> = HashMap::new();
    for ext in config.actuators.keys().copied().sorted() {
        let actuator = &config.actuators[&ext];
        if actuator.kind != "signal" {
            return Err(Error::UnknownActuatorKind(actuator.kind.clone()));
        }
        if actuator.target.kind != "node" {
            return Err(Error::UnknownActuatorTarget(actuator.target.kind.clone()));
        }
        let node = *node_index
            .get(&actuator.target.id)
            .ok_or_else(|| unknown("node", actuator.target.id))?;
        let mut phases = Vec::with_capacity(actuator.signal.len());
        for phase in &actuator.signal {
            let mut lane_groups = Vec::new();
            for rc_ext in &phase.roadconnections {
                if !connection_exts.contains(rc_ext) {
                    return Err(unknown("road connection", *rc_ext));
                }
                lane_groups.extend(connection_in_lgs[rc_ext].iter().copied());
            }
            lane_groups.sort_unstable();
            lane_groups.dedup();
            phases.push(SignalPhase::new(phase.phase, lane_groups));
        }
        let id = scenario.add_signal(SignalActuator::new(ext, node, actuator.dt, phases))?;
        actuator_index.insert(ext, id);
    }

    for ext in config.controllers.keys().copied().sorted() {
        let controller = &config.controllers[&ext];
        if controller.kind != "sig_pretimed" {
            return Err(Error::UnknownControllerKind(controller.kind.clone()));
        }
        let actuators: Vec<ActuatorId> = controller
            .target_actuators
            .iter()
            .map(|id| {
                actuator_index
                    .get(id)
                    .copied()
                    .ok_or_else(|| unknown("actuator", *id))
            })
            .collect::<Result<_>>()?;
        let cycle = controller.cycle.ok_or_else(|| {
            Error::InvalidConfig(format!("controller {} has no cycle", ext))
        })?;
        let stages = controller
            .stages
            .iter()
            .map(|stage| Stage {
                duration: stage.duration,
                phase_ids: stage.phases.clone(),
            })
            .collect();
        scenario.add_controller(StageController::new(
            ext,
            actuators,
            controller.dt,
            cycle,
            controller.offset.unwrap_or(0.0),
            stages,
        )?);
    }

    if !config.outputs.is_empty() {
        let (folder, prefix) = output.ok_or_else(|| {
            Error::InvalidConfig(String::from(
                "scenario requests outputs but no output folder was given",
            ))
        })?;
        for request in &config.outputs {
            let kind = request
                .kind
                .parse::<OutputKind>()
                .map_err(|_| Error::UnknownOutputKind(request.kind.clone()))?;
            let writer = Output::to_file(kind, request.dt, folder, prefix, &scenario.network)?;
            scenario.add_output(writer);
        }
    }

    Ok(scenario)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn intersection_config() -> ScenarioConfig {
        serde_json::from_value(json!({
            "network": {
                "roadparams": {
                    "0": { "capacity": 1800, "speed": 60, "jam_density": 100 }
                },
                "nodes": { "1": {}, "2": {}, "3": {}, "4": {} },
                "links": {
                    "10": { "full_lanes": 3, "length": 500, "start": 1, "end": 2, "roadparam": 0 },
                    "20": { "full_lanes": 2, "length": 400, "start": 2, "end": 3, "roadparam": 0 },
                    "30": { "full_lanes": 1, "length": 300, "start": 2, "end": 4, "roadparam": 0 }
                },
                "roadconnections": {
                    "100": { "in_link": 10, "out_link": 20, "in_link_lanes": "1-2" },
                    "101": { "in_link": 10, "out_link": 30, "in_link_lanes": "3-3" }
                }
            },
            "demands": [
                { "link": 10, "value": [1800], "dt": null }
            ],
            "splits": [
                { "link_in": 10, "link_out_value": { "20": [0.7], "30": [0.3] } }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_lane_groups_follow_road_connections() {
        let scenario = build_scenario(&intersection_config(), Some(17), None).unwrap();
        let network = &scenario.network;
        let link = network.link(LinkId::from(0));
        assert_eq!(link.ext_id, 10);
        assert_eq!(link.lane_groups.len(), 2);
        let first = network.lane_group(link.lane_groups[0]);
        let second = network.lane_group(link.lane_groups[1]);
        assert_eq!((first.start_lane, first.num_lanes), (1, 2));
        assert_eq!((second.start_lane, second.num_lanes), (3, 1));
        // Lanes 1-2 reach link 20, lane 3 reaches link 30.
        assert_eq!(
            link.lanegroups_for_outlink(Some(LinkId::from(1))),
            Some(&link.lane_groups[0..1])
        );
        assert_eq!(
            link.lanegroups_for_outlink(Some(LinkId::from(2))),
            Some(&link.lane_groups[1..2])
        );
    }

    #[test]
    fn test_source_and_sink_flags() {
        let scenario = build_scenario(&intersection_config(), Some(17), None).unwrap();
        let network = &scenario.network;
        assert!(network.link(LinkId::from(0)).is_source);
        assert!(!network.link(LinkId::from(0)).is_sink);
        assert!(network.link(LinkId::from(1)).is_sink);
        assert!(network.link(LinkId::from(2)).is_sink);
        assert!(network
            .lane_group(network.link(LinkId::from(0)).lane_groups[0])
            .max_vehicles
            .is_infinite());
    }

    #[test]
    fn test_unknown_actuator_kind_is_fatal() {
        let mut config = intersection_config();
        config.actuators.insert(
            0,
            serde_json::from_value(json!({
                "type": "ramp_meter",
                "target": { "type": "node", "id": 2 }
            }))
            .unwrap(),
        );
        assert!(matches!(
            build_scenario(&config, None, None),
            Err(Error::UnknownActuatorKind(kind)) if kind == "ramp_meter"
        ));
    }

    #[test]
    fn test_unknown_controller_kind_is_fatal() {
        let mut config = intersection_config();
        config.controllers.insert(
            0,
            serde_json::from_value(json!({
                "type": "sig_adaptive",
                "target_actuators": []
            }))
            .unwrap(),
        );
        assert!(matches!(
            build_scenario(&config, None, None),
            Err(Error::UnknownControllerKind(kind)) if kind == "sig_adaptive"
        ));
    }

    #[test]
    fn test_unknown_output_kind_is_fatal() {
        let mut config = intersection_config();
        config.outputs.push(
            serde_json::from_value(json!({ "type": "hologram", "dt": 10 })).unwrap(),
        );
        let dir = std::env::temp_dir();
        assert!(matches!(
            build_scenario(&config, None, Some((dir.as_path(), "t"))),
            Err(Error::UnknownOutputKind(kind)) if kind == "hologram"
        ));
    }

    #[test]
    fn test_duplicate_split_profile_is_fatal() {
        let mut config = intersection_config();
        config.splits.push(serde_json::from_value(json!({
            "link_in": 10,
            "link_out_value": { "20": [1.0] }
        }))
        .unwrap());
        assert!(matches!(
            build_scenario(&config, None, None),
            Err(Error::DuplicateSplitProfile(10))
        ));
    }

    #[test]
    fn test_lane_group_claimed_twice_is_fatal() {
        let mut config = intersection_config();
        config.actuators.insert(
            0,
            serde_json::from_value(json!({
                "type": "signal",
                "target": { "type": "node", "id": 2 },
                "signal": [
                    { "phase": 0, "roadconnections": [100] },
                    { "phase": 1, "roadconnections": [100] }
                ]
            }))
            .unwrap(),
        );
        assert!(matches!(
            build_scenario(&config, None, None),
            Err(Error::LaneGroupClaimed(_))
        ));
    }

    #[test]
    fn test_invalid_lane_range_is_fatal() {
        assert!(parse_lane_range("2-1").is_err());
        assert!(parse_lane_range("x-3").is_err());
        assert!(parse_lane_range("0-1").is_err());
        assert_eq!(parse_lane_range("1-3").unwrap(), (1, 3));
        assert_eq!(parse_lane_range(" 2-2").unwrap(), (2, 2));
    }

    #[test]
    fn test_unknown_stochastic_process_is_fatal() {
        let mut config = intersection_config();
        config.process = Some(String::from("uniform"));
        assert!(matches!(
            build_scenario(&config, None, None),
            Err(Error::UnknownStochasticProcess(_))
        ));
    }
}
