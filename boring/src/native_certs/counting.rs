//! In-process stand-in for CoreFoundation/Security that tracks every object
//! it hands out, so tests can assert each one is released exactly once.
//!
//! Objects are reference counted like their native counterparts: arrays
//! retain appended values and trust objects retain their certificates and
//! policy.

use super::cf::{CFIndex, CFTypeRef, OSStatus, SecurityApi};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ptr;

pub(crate) const NOT_TRUSTED: CFIndex = -67843;
pub(crate) const HOSTNAME_MISMATCH: CFIndex = -67602;

/// DER prefix the fake treats as undecodable.
pub(crate) const GARBAGE: &[u8] = b"garbage";
/// Leaf prefix the fake treats as anchored in the system store.
pub(crate) const TRUSTED_LEAF: &[u8] = b"trusted:";

#[derive(Debug, Clone, PartialEq)]
enum Object {
    Data(Vec<u8>),
    String(String),
    Array(Vec<usize>),
    Certificate(Vec<u8>),
    Policy(Option<usize>),
    Trust { certificates: usize, policy: usize },
    Error { code: CFIndex, description: Option<String> },
}

/// What `trust_evaluate_with_error` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Trusted,
    /// Untrusted with an error object carrying the scripted code/description.
    Untrusted,
    /// Untrusted without any error object.
    UntrustedSilently,
    /// A raw byte outside 0/1; an error object is handed out as well.
    Raw(u8),
    /// Trusted when the leaf starts with [`TRUSTED_LEAF`] and, if the policy
    /// names a host, the leaf ends with that host.
    ByLeaf,
}

#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub outcome: Outcome,
    pub error_code: CFIndex,
    pub error_description: Option<String>,
    pub fail_data_create: bool,
    pub trust_create_status: OSStatus,
    pub anchors_status: OSStatus,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            outcome: Outcome::ByLeaf,
            error_code: NOT_TRUSTED,
            error_description: Some("certificate is not trusted".to_owned()),
            fail_data_create: false,
            trust_create_status: 0,
            anchors_status: 0,
        }
    }
}

#[derive(Debug)]
struct Live {
    object: Object,
    refs: usize,
}

#[derive(Debug, Default)]
struct State {
    next: usize,
    live: HashMap<usize, Live>,
    created: usize,
    freed: usize,
    bad_releases: usize,
    evaluations: usize,
    policy_hosts: Vec<Option<String>>,
    default_anchors: usize,
}

impl State {
    fn alloc(&mut self, object: Object) -> CFTypeRef {
        self.next += 1;
        self.created += 1;
        self.live.insert(self.next, Live { object, refs: 1 });
        handle(self.next)
    }

    fn get(&self, cf: CFTypeRef) -> &Object {
        match self.live.get(&id(cf)) {
            Some(live) => &live.object,
            None => panic!("use of released or foreign handle {:p}", cf),
        }
    }

    fn retain(&mut self, id: usize) {
        match self.live.get_mut(&id) {
            Some(live) => live.refs += 1,
            None => panic!("retain of released handle {}", id),
        }
    }

    fn release(&mut self, id: usize) {
        let live = match self.live.get_mut(&id) {
            Some(live) => live,
            None => {
                self.bad_releases += 1;
                return;
            }
        };
        live.refs -= 1;
        if live.refs > 0 {
            return;
        }
        let object = match self.live.remove(&id) {
            Some(live) => live.object,
            None => return,
        };
        self.freed += 1;
        match object {
            Object::Array(members) => members.into_iter().for_each(|m| self.release(m)),
            Object::Policy(Some(host)) => self.release(host),
            Object::Trust {
                certificates,
                policy,
            } => {
                self.release(certificates);
                self.release(policy);
            }
            _ => {}
        }
    }

    fn string(&self, id: usize) -> Option<String> {
        match self.live.get(&id).map(|l| &l.object) {
            Some(Object::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn leaf_trusted(&self, trust: CFTypeRef) -> bool {
        let (certificates, policy) = match self.get(trust) {
            Object::Trust {
                certificates,
                policy,
            } => (*certificates, *policy),
            other => panic!("expected a trust object, got {:?}", other),
        };
        let leaf = match self.live.get(&certificates).map(|l| &l.object) {
            Some(Object::Array(members)) => members.first().copied(),
            _ => None,
        };
        let leaf = match leaf.and_then(|l| self.live.get(&l)).map(|l| &l.object) {
            Some(Object::Certificate(der)) => der.clone(),
            _ => return false,
        };
        let host = match self.live.get(&policy).map(|l| &l.object) {
            Some(Object::Policy(Some(host))) => self.string(*host),
            _ => None,
        };
        leaf.starts_with(TRUSTED_LEAF)
            && host.map_or(true, |h| leaf.ends_with(h.as_bytes()))
    }
}

fn handle(id: usize) -> CFTypeRef {
    (id << 4) as CFTypeRef
}

fn id(cf: CFTypeRef) -> usize {
    cf as usize >> 4
}

#[derive(Debug)]
pub(crate) struct CountingSecurity {
    script: Script,
    state: Mutex<State>,
}

impl CountingSecurity {
    pub(crate) fn new(script: Script) -> Self {
        CountingSecurity {
            script,
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.state.lock().live.len()
    }

    pub(crate) fn created(&self) -> usize {
        self.state.lock().created
    }

    pub(crate) fn evaluations(&self) -> usize {
        self.state.lock().evaluations
    }

    pub(crate) fn default_anchors(&self) -> usize {
        self.state.lock().default_anchors
    }

    pub(crate) fn policy_hosts(&self) -> Vec<Option<String>> {
        self.state.lock().policy_hosts.clone()
    }

    /// Panics unless every object handed out has been released exactly once.
    pub(crate) fn assert_balanced(&self) {
        let state = self.state.lock();
        assert_eq!(state.bad_releases, 0, "released a dead or foreign handle");
        assert!(
            state.live.is_empty(),
            "leaked objects: {:?}",
            state.live.values().map(|l| &l.object).collect::<Vec<_>>()
        );
        assert_eq!(state.created, state.freed);
    }
}

impl SecurityApi for CountingSecurity {
    unsafe fn data_create(&self, bytes: &[u8]) -> CFTypeRef {
        if self.script.fail_data_create {
            return ptr::null();
        }
        self.state.lock().alloc(Object::Data(bytes.to_vec()))
    }

    unsafe fn string_create(&self, value: &str) -> CFTypeRef {
        self.state.lock().alloc(Object::String(value.to_owned()))
    }

    unsafe fn string_to_owned(&self, string: CFTypeRef) -> Option<String> {
        let state = self.state.lock();
        state.get(string);
        state.string(id(string))
    }

    unsafe fn array_create_mutable(&self) -> CFTypeRef {
        self.state.lock().alloc(Object::Array(Vec::new()))
    }

    unsafe fn array_append_value(&self, array: CFTypeRef, value: CFTypeRef) {
        let mut state = self.state.lock();
        state.get(value);
        state.retain(id(value));
        match state.live.get_mut(&id(array)).map(|l| &mut l.object) {
            Some(Object::Array(members)) => members.push(id(value)),
            other => panic!("append to non-array {:?}", other),
        }
    }

    unsafe fn certificate_create_with_data(&self, data: CFTypeRef) -> CFTypeRef {
        let mut state = self.state.lock();
        let der = match state.get(data) {
            Object::Data(der) => der.clone(),
            other => panic!("certificate from non-data {:?}", other),
        };
        if der.starts_with(GARBAGE) {
            return ptr::null();
        }
        state.alloc(Object::Certificate(der))
    }

    unsafe fn policy_create_ssl(&self, server: bool, hostname: CFTypeRef) -> CFTypeRef {
        assert!(server, "client policies are never requested");
        let mut state = self.state.lock();
        let host = if hostname.is_null() {
            None
        } else {
            state.get(hostname);
            state.retain(id(hostname));
            Some(id(hostname))
        };
        let name = host.and_then(|h| state.string(h));
        state.policy_hosts.push(name);
        state.alloc(Object::Policy(host))
    }

    unsafe fn trust_create_with_certificates(
        &self,
        certificates: CFTypeRef,
        policies: CFTypeRef,
        trust: *mut CFTypeRef,
    ) -> OSStatus {
        if self.script.trust_create_status != 0 {
            return self.script.trust_create_status;
        }
        let mut state = self.state.lock();
        state.get(certificates);
        state.get(policies);
        state.retain(id(certificates));
        state.retain(id(policies));
        *trust = state.alloc(Object::Trust {
            certificates: id(certificates),
            policy: id(policies),
        });
        0
    }

    unsafe fn trust_set_anchor_certificates(
        &self,
        trust: CFTypeRef,
        anchors: CFTypeRef,
    ) -> OSStatus {
        let mut state = self.state.lock();
        state.get(trust);
        if anchors.is_null() {
            state.default_anchors += 1;
        }
        self.script.anchors_status
    }

    unsafe fn trust_evaluate_with_error(&self, trust: CFTypeRef, error: *mut CFTypeRef) -> u8 {
        let mut state = self.state.lock();
        state.get(trust);
        state.evaluations += 1;
        let fail = |state: &mut State, code: CFIndex, description: Option<String>| {
            *error = state.alloc(Object::Error { code, description });
        };
        match self.script.outcome {
            Outcome::Trusted => 1,
            Outcome::Untrusted => {
                fail(
                    &mut *state,
                    self.script.error_code,
                    self.script.error_description.clone(),
                );
                0
            }
            Outcome::UntrustedSilently => 0,
            Outcome::Raw(raw) => {
                fail(&mut *state, self.script.error_code, None);
                raw
            }
            Outcome::ByLeaf => {
                if state.leaf_trusted(trust) {
                    1
                } else {
                    fail(
                        &mut *state,
                        self.script.error_code,
                        self.script.error_description.clone(),
                    );
                    0
                }
            }
        }
    }

    unsafe fn error_get_code(&self, error: CFTypeRef) -> CFIndex {
        match self.state.lock().get(error) {
            Object::Error { code, .. } => *code,
            other => panic!("code of non-error {:?}", other),
        }
    }

    unsafe fn error_copy_description(&self, error: CFTypeRef) -> CFTypeRef {
        let mut state = self.state.lock();
        let description = match state.get(error) {
            Object::Error { description, .. } => description.clone(),
            other => panic!("description of non-error {:?}", other),
        };
        match description {
            Some(d) => state.alloc(Object::String(d)),
            None => ptr::null(),
        }
    }

    unsafe fn copy_error_message_string(&self, status: OSStatus) -> CFTypeRef {
        self.state
            .lock()
            .alloc(Object::String(format!("fake status {}", status)))
    }

    unsafe fn release(&self, cf: CFTypeRef) {
        let mut state = self.state.lock();
        if cf.is_null() {
            state.bad_releases += 1;
            return;
        }
        state.release(id(cf));
    }
}
