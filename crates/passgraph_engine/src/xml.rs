// SPDX-License-Identifier: MIT OR Apache-2.0
//! XML codec for saved graphs.
//!
//! ```xml
//! <graph>
//!     <canvas><offset>x,y</offset><scale>f</scale></canvas>
//!     <nodes>
//!         <node name=".." type=".." pos="x,y" id="N">
//!             <slot index=".." name=".." type=".." place="INPUT|OUTPUT" id="P"/>
//!         </node>
//!     </nodes>
//!     <links><link in="N:P" out="N:P"/></links>
//!     <outputs><output type="left|middle|right" ids="N:P"/></outputs>
//! </graph>
//! ```
//!
//! A sub-graph node lists its slots followed by a nested `<graph>`.

use crate::document::{CanvasRecord, GraphDocument, LinkRecord, NodeRecord, OutputRecord, SlotAddress, SlotRecord};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, OutputButton};
use crate::id::{NodeId, PinId};
use crate::node::NodeRegistry;
use crate::slot::SlotPlace;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Generic element tree read from the XML text
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut element = Element {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn parse_tree(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = root.or(Some(element)),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(GraphError::Malformed("unbalanced closing tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = root.or(Some(element)),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(GraphError::Malformed("unclosed element".to_string()));
    }
    root.ok_or_else(|| GraphError::Malformed("empty document".to_string()))
}

fn parse_pair(value: &str, what: &str) -> Result<[f32; 2]> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| GraphError::Malformed(format!("{what} '{value}' is not x,y")))?;
    Ok([parse_number(x, what)?, parse_number(y, what)?])
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GraphError::Malformed(format!("{what} '{value}' is not a number")))
}

fn parse_place(value: &str) -> Result<SlotPlace> {
    match value {
        "INPUT" => Ok(SlotPlace::Input),
        "OUTPUT" => Ok(SlotPlace::Output),
        other => Err(GraphError::Malformed(format!("unknown slot place '{other}'"))),
    }
}

fn read_graph(element: &Element) -> Result<GraphDocument> {
    if element.name != "graph" {
        return Err(GraphError::Malformed(format!(
            "expected <graph>, found <{}>",
            element.name
        )));
    }

    let mut document = GraphDocument::default();

    if let Some(canvas) = element.child("canvas") {
        let mut record = CanvasRecord::default();
        if let Some(offset) = canvas.child("offset") {
            record.offset = parse_pair(&offset.text, "canvas offset")?;
        }
        if let Some(scale) = canvas.child("scale") {
            record.scale = parse_number(&scale.text, "canvas scale")?;
        }
        document.canvas = record;
    }

    if let Some(nodes) = element.child("nodes") {
        for node in nodes.children_named("node") {
            document.nodes.push(read_node(node)?);
        }
    }

    if let Some(links) = element.child("links") {
        for link in links.children_named("link") {
            let input = link
                .attr("in")
                .ok_or_else(|| GraphError::Malformed("link without 'in'".to_string()))?;
            let output = link
                .attr("out")
                .ok_or_else(|| GraphError::Malformed("link without 'out'".to_string()))?;
            document.links.push(LinkRecord {
                input: input.parse()?,
                output: output.parse()?,
            });
        }
    }

    if let Some(outputs) = element.child("outputs") {
        for output in outputs.children_named("output") {
            let tag = output.attr("type").unwrap_or_default();
            let Some(button) = OutputButton::from_tag(tag) else {
                tracing::warn!("ignoring graph output bound to unknown button '{}'", tag);
                continue;
            };
            let ids: SlotAddress = output
                .attr("ids")
                .ok_or_else(|| GraphError::Malformed("output without 'ids'".to_string()))?
                .parse()?;
            document.outputs.push(OutputRecord { button, ids });
        }
    }

    Ok(document)
}

fn read_node(element: &Element) -> Result<NodeRecord> {
    let mut slots = Vec::new();
    for slot in element.children_named("slot") {
        slots.push(SlotRecord {
            index: slot
                .attr("index")
                .map(|v| parse_number(v, "slot index"))
                .transpose()?
                .unwrap_or(0),
            name: slot.attr("name").unwrap_or_default().to_string(),
            slot_type: slot.attr("type").unwrap_or_default().to_string(),
            place: parse_place(slot.attr("place").unwrap_or_default())?,
            id: PinId(
                slot.attr("id")
                    .map(|v| parse_number(v, "slot id"))
                    .transpose()?
                    .unwrap_or(0),
            ),
        });
    }

    Ok(NodeRecord {
        name: element.attr("name").unwrap_or_default().to_string(),
        node_type: element.attr("type").unwrap_or_default().to_string(),
        pos: element
            .attr("pos")
            .map(|v| parse_pair(v, "node pos"))
            .transpose()?
            .unwrap_or([0.0, 0.0]),
        id: NodeId(
            element
                .attr("id")
                .map(|v| parse_number(v, "node id"))
                .transpose()?
                .unwrap_or(0),
        ),
        slots,
        graph: element.child("graph").map(read_graph).transpose()?,
    })
}

/// Writes a [`GraphDocument`] as indented XML
struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    fn new(indent: &str) -> Self {
        let unit = indent.bytes().next().unwrap_or(b' ');
        Self {
            inner: Writer::new_with_indent(Vec::new(), unit, indent.len()),
        }
    }

    fn open(&mut self, name: &str) -> Result<()> {
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.open(name)?;
        self.inner.write_event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn graph(&mut self, document: &GraphDocument) -> Result<()> {
        self.open("graph")?;

        self.open("canvas")?;
        let [x, y] = document.canvas.offset;
        self.text_element("offset", &format!("{x},{y}"))?;
        self.text_element("scale", &document.canvas.scale.to_string())?;
        self.close("canvas")?;

        self.open("nodes")?;
        for node in &document.nodes {
            self.node(node)?;
        }
        self.close("nodes")?;

        self.open("links")?;
        for link in &document.links {
            let mut element = BytesStart::new("link");
            element.push_attribute(("in", link.input.to_string().as_str()));
            element.push_attribute(("out", link.output.to_string().as_str()));
            self.inner.write_event(Event::Empty(element))?;
        }
        self.close("links")?;

        self.open("outputs")?;
        for output in &document.outputs {
            let mut element = BytesStart::new("output");
            element.push_attribute(("type", output.button.as_str()));
            element.push_attribute(("ids", output.ids.to_string().as_str()));
            self.inner.write_event(Event::Empty(element))?;
        }
        self.close("outputs")?;

        self.close("graph")
    }

    fn node(&mut self, node: &NodeRecord) -> Result<()> {
        let mut element = BytesStart::new("node");
        element.push_attribute(("name", node.name.as_str()));
        element.push_attribute(("type", node.node_type.as_str()));
        element.push_attribute(("pos", format!("{},{}", node.pos[0], node.pos[1]).as_str()));
        element.push_attribute(("id", node.id.to_string().as_str()));
        if node.slots.is_empty() && node.graph.is_none() {
            self.inner.write_event(Event::Empty(element))?;
            return Ok(());
        }

        self.inner.write_event(Event::Start(element))?;
        for slot in &node.slots {
            let mut element = BytesStart::new("slot");
            element.push_attribute(("index", slot.index.to_string().as_str()));
            element.push_attribute(("name", slot.name.as_str()));
            element.push_attribute(("type", slot.slot_type.as_str()));
            element.push_attribute(("place", slot.place.to_string().as_str()));
            element.push_attribute(("id", slot.id.to_string().as_str()));
            self.inner.write_event(Event::Empty(element))?;
        }
        if let Some(graph) = &node.graph {
            self.graph(graph)?;
        }
        self.close("node")
    }

    fn finish(self) -> Result<String> {
        let mut text = String::from_utf8(self.inner.into_inner())?;
        text.push('\n');
        Ok(text)
    }
}

impl GraphDocument {
    /// Parse the XML form of a saved graph
    pub fn from_xml(text: &str) -> Result<Self> {
        read_graph(&parse_tree(text)?)
    }

    /// Write the XML form, indenting each level with `indent`
    pub fn to_xml(&self, indent: &str) -> Result<String> {
        let mut writer = XmlWriter::new(indent);
        writer.graph(self)?;
        writer.finish()
    }
}

impl Graph {
    /// Serialize the whole engine to XML
    pub fn to_xml(&self) -> Result<String> {
        self.to_document().to_xml(&self.config().xml_indent)
    }

    /// Build a fresh engine from XML
    pub fn from_xml(text: &str, registry: &NodeRegistry) -> Result<Self> {
        let document = GraphDocument::from_xml(text)?;
        Graph::from_document(&document, registry)
    }

    /// Load XML under the root of this engine
    pub fn load_xml(&mut self, text: &str, registry: &NodeRegistry) -> Result<Vec<NodeId>> {
        let document = GraphDocument::from_xml(text)?;
        self.load_document(&document, registry)
    }
}
