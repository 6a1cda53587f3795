//! Node shapes returned by Node-typed syscalls.

use crate::ast::{AttrValue, Node};
use crate::capability::host::{FileStat, UdpPacket};
use crate::capability::replay::UiEvent;

/// `Block#<root_id> { Lit#<prefix>0(value="..") ... }`
pub fn string_list_node(root_id: &str, child_prefix: &str, values: &[String]) -> Node {
    let children = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            Node::new("Lit", format!("{}{}", child_prefix, i))
                .with_attr("value", AttrValue::string(value.clone()))
        })
        .collect();
    Node::new("Block", root_id).with_children(children)
}

pub fn argv_node(values: &[String]) -> Node {
    string_list_node("argv", "argv", values)
}

pub fn dir_node(entries: &[String]) -> Node {
    string_list_node("dir", "entry", entries)
}

pub fn stat_node(stat: &FileStat) -> Node {
    Node::new("Stat", "stat")
        .with_attr("type", AttrValue::string(stat.kind.clone()))
        .with_attr("size", AttrValue::Int(stat.size))
        .with_attr("mtime", AttrValue::Int(stat.mtime_unix_ms))
}

pub fn udp_packet_node(packet: &UdpPacket) -> Node {
    Node::new("UdpPacket", "udpPacket")
        .with_attr("host", AttrValue::string(packet.host.clone()))
        .with_attr("port", AttrValue::Int(packet.port))
        .with_attr("data", AttrValue::string(packet.data.clone()))
}

pub fn ui_event_node(event: &UiEvent) -> Node {
    Node::new("UiEvent", "uiEvent")
        .with_attr("type", AttrValue::string(event.kind.clone()))
        .with_attr("targetId", AttrValue::string(event.target_id.clone()))
        .with_attr("x", AttrValue::Int(event.x))
        .with_attr("y", AttrValue::Int(event.y))
        .with_attr("key", AttrValue::string(event.key.clone()))
        .with_attr("text", AttrValue::string(event.text.clone()))
        .with_attr("modifiers", AttrValue::string(event.modifiers.clone()))
        .with_attr("repeat", AttrValue::Bool(event.repeat))
}

pub fn window_size_node(width: i32, height: i32) -> Node {
    Node::new("UiWindowSize", "uiWindowSize")
        .with_attr("width", AttrValue::Int(width))
        .with_attr("height", AttrValue::Int(height))
}
