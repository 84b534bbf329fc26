//! Shared scaffolding for the topology and monitoring suites.
#![allow(dead_code)]

use bson::{bson, doc, Document};
use bufstream::BufStream;

use mongodb_cluster::apm::{
    EventHandler, ServerAdded, ServerDescriptionChanged, ServerRemoved, TopologyChanged,
};
use mongodb_cluster::connstring::{self, Host};
use mongodb_cluster::error::{Error, Result};
use mongodb_cluster::stream::Stream;
use mongodb_cluster::topology::monitor::IsMasterResult;
use mongodb_cluster::topology::server::ServerDescription;
use mongodb_cluster::topology::TopologyType;
use mongodb_cluster::wire::CommandExecutor;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub fn host(seed: &str) -> Host {
    connstring::parse_host(seed).unwrap()
}

/// Builds a description the way a monitor would, from an isMaster reply.
pub fn description(seed: &str, reply: Document, rtt: f64) -> ServerDescription {
    let ismaster = IsMasterResult::new(reply).unwrap();
    ServerDescription::from_is_master(host(seed), ismaster, rtt)
}

pub fn standalone(seed: &str) -> ServerDescription {
    description(seed, doc! { "ok": 1, "ismaster": true }, 1.0)
}

pub fn mongos(seed: &str, rtt: f64) -> ServerDescription {
    description(
        seed,
        doc! { "ok": 1, "ismaster": true, "msg": "isdbgrid" },
        rtt,
    )
}

pub fn primary(seed: &str, set_name: &str, hosts: &[&str], rtt: f64) -> ServerDescription {
    let hosts: Vec<_> = hosts
        .iter()
        .map(|h| bson::Bson::String((*h).to_owned()))
        .collect();
    description(
        seed,
        doc! {
            "ok": 1,
            "ismaster": true,
            "setName": set_name,
            "hosts": bson::Bson::Array(hosts)
        },
        rtt,
    )
}

/// A secondary that does not report a host list, so applying it never
/// reconciles membership.
pub fn secondary(seed: &str, set_name: &str, rtt: f64) -> ServerDescription {
    description(
        seed,
        doc! {
            "ok": 1,
            "ismaster": false,
            "secondary": true,
            "setName": set_name
        },
        rtt,
    )
}

/// One step of a scripted wire conversation.
#[derive(Clone)]
pub enum ScriptedReply {
    /// Reply with the document after the given delay.
    Reply(Duration, Document),
    /// Fail the round trip.
    Fail,
}

/// Wire stub that walks through a script of replies, repeating the last
/// entry once the script is exhausted. Counts every call.
pub struct ScriptedExecutor {
    script: Mutex<Vec<ScriptedReply>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ScriptedReply>) -> ScriptedExecutor {
        assert!(!script.is_empty());
        ScriptedExecutor {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replies to every probe with the same document, immediately.
    pub fn constant(reply: Document) -> ScriptedExecutor {
        ScriptedExecutor::new(vec![ScriptedReply::Reply(Duration::from_millis(0), reply)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute_command(
        &self,
        _stream: &mut BufStream<Stream>,
        _command: &Document,
    ) -> Result<Document> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        };

        match reply {
            ScriptedReply::Reply(delay, doc) => {
                if delay > Duration::from_millis(0) {
                    thread::sleep(delay);
                }
                Ok(doc)
            }
            ScriptedReply::Fail => Err(Error::ConnectionError(
                "Scripted probe failure.".to_owned(),
            )),
        }
    }
}

/// What an event handler observed, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Observed {
    Added(Host),
    Removed(Host),
    DescriptionChanged(Host),
    TopologyChanged(TopologyType, TopologyType),
}

#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Observed>>,
}

impl EventRecorder {
    pub fn new() -> EventRecorder {
        EventRecorder::default()
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &Observed) -> bool {
        self.events.lock().unwrap().contains(event)
    }
}

impl EventHandler for EventRecorder {
    fn on_server_added(&self, event: &ServerAdded) {
        self.events
            .lock()
            .unwrap()
            .push(Observed::Added(event.host.clone()));
    }

    fn on_server_removed(&self, event: &ServerRemoved) {
        self.events
            .lock()
            .unwrap()
            .push(Observed::Removed(event.host.clone()));
    }

    fn on_server_description_changed(&self, event: &ServerDescriptionChanged) {
        self.events
            .lock()
            .unwrap()
            .push(Observed::DescriptionChanged(event.host.clone()));
    }

    fn on_topology_changed(&self, event: &TopologyChanged) {
        self.events.lock().unwrap().push(Observed::TopologyChanged(
            event.previous.topology_type,
            event.new.topology_type,
        ));
    }
}
