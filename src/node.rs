//! The protocol engine: node construction/pre-population, the UDP receive
//! loop, the ESV dispatch table, and the send primitives.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, error, info, trace, warn};
use tokio::net::UdpSocket;

use crate::codec::{self, Esv, Frame, Property};
use crate::error::EchonetError;
use crate::eoj::{Eoj, CONTROLLER, NODE_PROFILE};
use crate::store::{MapKind, PropertyStore, PropertyValue};

pub const ECHONET_PORT: u16 = 3610;
pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 0);
const RECV_BUFFER_SIZE: usize = 1500;
const MIN_FRAME_LEN: usize = 13;
const RECV_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// A user callback: `(ip, tid, seoj, deoj, esv, opc, epc, value) -> bool`.
/// Only the SET callback's return value is load-bearing; GET/INF callback
/// returns are observational.
pub type Callback =
    Arc<dyn Fn(IpAddr, u16, Eoj, Eoj, Esv, u8, u8, &PropertyValue) -> bool + Send + Sync>;

fn dummy_callback() -> Callback {
    Arc::new(|_ip, _tid, _seoj, _deoj, _esv, _opc, _epc, _value| true)
}

/// The node identity and transport inputs a binary entry point gathers
/// from CLI flags or the OS and hands to [`Node::new`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub device_eojs: Vec<Eoj>,
    pub maker_code: [u8; 3],
    pub local_addr: Ipv4Addr,
    pub mac: [u8; 6],
}

impl NodeConfig {
    pub fn new(device_eojs: Vec<Eoj>, local_addr: Ipv4Addr, mac: [u8; 6]) -> Self {
        Self {
            device_eojs,
            maker_code: [0x00, 0x00, 0x77],
            local_addr,
            mac,
        }
    }

    pub fn with_maker_code(mut self, maker_code: [u8; 3]) -> Self {
        self.maker_code = maker_code;
        self
    }

    /// Discover the local IPv4 address that would be used to reach the
    /// network (the portable subset of what per-platform interface
    /// enumeration does), by connecting a UDP socket and reading back its
    /// local address. No packets are sent; UDP `connect` only binds a route.
    pub fn autodetect(device_eojs: Vec<Eoj>, mac: [u8; 6]) -> std::io::Result<Self> {
        let probe = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        probe.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        let local_addr = match probe.local_addr()?.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };
        Ok(Self::new(device_eojs, local_addr, mac))
    }
}

struct Inner {
    node_profile: PropertyStore,
    devices: BTreeMap<Eoj, PropertyStore>,
    tid: u16,
}

/// An ECHONET Lite node: the node-profile object, one store per configured
/// device EOJ, the TID counter, and (once [`Node::begin`] runs) the bound
/// receive socket.
pub struct Node {
    config: NodeConfig,
    inner: Mutex<Inner>,
    socket: OnceLock<Arc<UdpSocket>>,
    on_set: OnceLock<Callback>,
    on_get: OnceLock<Callback>,
    on_inf: OnceLock<Callback>,
}

/// Build the D5/D6-style flattened instance list: `[N, eoj1(3), eoj2(3), ..]`.
fn instance_list(eojs: &[Eoj]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + eojs.len() * 3);
    out.push(eojs.len() as u8);
    for eoj in eojs {
        out.extend_from_slice(&eoj.to_bytes());
    }
    out
}

/// Build the D7-style deduplicated (class-group, class) list, first
/// occurrence order: `[M, cg1, c1, cg2, c2, ..]`.
fn class_list(eojs: &[Eoj]) -> Vec<u8> {
    let mut seen: Vec<(u8, u8)> = Vec::new();
    for eoj in eojs {
        let pair = (eoj.class_group, eoj.class);
        if !seen.contains(&pair) {
            seen.push(pair);
        }
    }
    let mut out = Vec::with_capacity(1 + seen.len() * 2);
    out.push(seen.len() as u8);
    for (cg, c) in seen {
        out.push(cg);
        out.push(c);
    }
    out
}

impl Node {
    /// Construct the node profile store and one store per device EOJ,
    /// pre-populated with the records a conformant node must report.
    pub fn new(config: NodeConfig) -> Self {
        let mut devices = BTreeMap::new();
        for &eoj in &config.device_eojs {
            let mut store = PropertyStore::new();
            store.set_value(0x80, vec![0x30]);
            store.set_value(0x81, vec![0x00]);
            store.set_value(0x82, vec![0x00, 0x00, 0x52, 0x01]);
            store.set_value(0x83, identification_number(&config, eoj));
            store.set_value(0x88, vec![0x42]);
            store.set_value(0x8A, maker_code_bytes(config.maker_code));
            store.set_map(MapKind::Inf, vec![0x80, 0xD6, 0x88]);
            store.set_map(MapKind::Set, vec![0x80, 0x81]);
            store.set_map(
                MapKind::Get,
                vec![0x80, 0x81, 0x82, 0x83, 0x88, 0x8A, 0x9D, 0x9E, 0x9F],
            );
            devices.insert(eoj, store);
        }

        let mut node_profile = PropertyStore::new();
        node_profile.set_value(0x80, vec![0x30]);
        node_profile.set_value(0x82, vec![0x01, 0x0D, 0x01, 0x00]);
        node_profile.set_value(0x83, identification_number(&config, NODE_PROFILE));
        node_profile.set_value(0x88, vec![0x42]);
        node_profile.set_value(0x8A, maker_code_bytes(config.maker_code));
        node_profile.set_value(0xBF, vec![0x00, 0x00]);

        let devs = instance_list(&config.device_eojs);
        let classes = class_list(&config.device_eojs);
        node_profile.set_value(0xD3, vec![0x00, 0x00, config.device_eojs.len() as u8]);
        node_profile.set_value(0xD4, vec![0x00, classes[0]]);
        node_profile.set_value(0xD5, devs.clone());
        node_profile.set_value(0xD6, devs);
        node_profile.set_value(0xD7, classes);

        node_profile.set_map(MapKind::Inf, vec![0x80, 0xD5]);
        node_profile.set_map(MapKind::Set, vec![0x80]);
        node_profile.set_map(
            MapKind::Get,
            vec![
                0x80, 0x82, 0x83, 0x88, 0x8A, 0x9D, 0x9E, 0x9F, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7,
            ],
        );

        Self {
            config,
            inner: Mutex::new(Inner {
                node_profile,
                devices,
                tid: 0,
            }),
            socket: OnceLock::new(),
            on_set: OnceLock::new(),
            on_get: OnceLock::new(),
            on_inf: OnceLock::new(),
        }
    }

    /// Bind the receive socket, join the multicast group, start the receive
    /// loop, then emit the two unannounced startup INFs (power, instance
    /// list) from the node profile.
    pub async fn begin(
        self: &Arc<Self>,
        on_set: Option<Callback>,
        on_get: Option<Callback>,
        on_inf: Option<Callback>,
    ) -> Result<(), EchonetError> {
        let _ = self.on_set.set(on_set.unwrap_or_else(dummy_callback));
        let _ = self.on_get.set(on_get.unwrap_or_else(dummy_callback));
        let _ = self.on_inf.set(on_inf.unwrap_or_else(dummy_callback));

        let socket = bind_receive_socket(self.config.local_addr)?;
        let socket = Arc::new(socket);
        let _ = self.socket.set(Arc::clone(&socket));
        info!(
            "bound ECHONET Lite receive socket on port {}, joined {}",
            ECHONET_PORT, MULTICAST_ADDR
        );

        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.receive_loop().await;
        });

        let power = self
            .inner
            .lock()
            .unwrap()
            .node_profile
            .get(0x80)
            .cloned();
        if let Some(power) = power {
            self.send_multicast_notify(NODE_PROFILE, 0x80, &power).await;
        }
        let instances = self
            .inner
            .lock()
            .unwrap()
            .node_profile
            .get(0xD5)
            .cloned();
        if let Some(instances) = instances {
            self.send_multicast_notify(NODE_PROFILE, 0xD5, &instances)
                .await;
        }

        Ok(())
    }

    async fn receive_loop(self: Arc<Self>) {
        let socket = self.socket.get().expect("begin() binds the socket").clone();
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, addr))) => {
                    let datagram = &buf[..len];
                    trace!("recv {} bytes from {}", len, addr);
                    self.handle_datagram(addr.ip(), datagram).await;
                }
                Ok(Err(e)) => error!("receive socket error: {e}"),
                Err(_elapsed) => continue,
            }
        }
    }

    async fn handle_datagram(&self, ip: IpAddr, data: &[u8]) {
        if !self.verify(data) {
            trace!("dropped malformed or unserved datagram from {ip}");
            return;
        }
        let frame = match codec::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropped unparseable datagram from {ip}: {e}");
                return;
            }
        };
        self.dispatch(ip, frame).await;
    }

    /// Pre-dispatch verification: size, EHD, served-EOJ, and (for
    /// non-SETGET-family ESVs) the OPC property-list walk.
    fn verify(&self, data: &[u8]) -> bool {
        if data.len() < MIN_FRAME_LEN {
            return false;
        }
        if data[0] != 0x10 || data[1] != 0x81 {
            return false;
        }
        let deoj = Eoj::from_bytes([data[7], data[8], data[9]]);
        if !self.is_served(deoj) {
            return false;
        }
        match Esv::try_from(data[10]) {
            Ok(esv) if esv.is_setget_family() => true,
            Ok(_) => codec::verify_opc_walk(data, 11),
            Err(_) => false,
        }
    }

    fn is_served(&self, deoj: Eoj) -> bool {
        if deoj.is_node_profile_alias() {
            return true;
        }
        let inner = self.inner.lock().unwrap();
        if deoj.is_wildcard() {
            inner.devices.keys().any(|e| e.same_class(deoj))
        } else {
            inner.devices.contains_key(&deoj)
        }
    }

    /// Resolve a (possibly wildcard) DEOJ to the concrete object(s) it
    /// addresses.
    fn resolve_targets(&self, deoj: Eoj) -> Vec<Eoj> {
        if deoj.is_node_profile_alias() {
            return vec![NODE_PROFILE];
        }
        let inner = self.inner.lock().unwrap();
        if deoj.is_wildcard() {
            inner
                .devices
                .keys()
                .filter(|e| e.same_class(deoj))
                .copied()
                .collect()
        } else if inner.devices.contains_key(&deoj) {
            vec![deoj]
        } else {
            vec![]
        }
    }

    async fn dispatch(&self, ip: IpAddr, frame: Frame) {
        let seoj = Eoj::from_bytes(frame.seoj);
        let requested_deoj = Eoj::from_bytes(frame.deoj);
        let targets = self.resolve_targets(requested_deoj);

        for target in targets {
            self.dispatch_one(ip, frame.tid, seoj, target, frame.esv, &frame.props)
                .await;
        }
    }

    async fn dispatch_one(
        &self,
        ip: IpAddr,
        tid: u16,
        seoj: Eoj,
        deoj: Eoj,
        esv: Esv,
        props: &[Property],
    ) {
        let opc = props.len() as u8;

        match esv {
            Esv::Get | Esv::InfReq | Esv::InfC => {
                for p in props {
                    self.invoke_get_callback(ip, tid, seoj, deoj, esv, opc, p.epc);
                }
            }
            Esv::SetI | Esv::SetC | Esv::SetGet => {}
            _ => {
                for p in props {
                    self.invoke_inf_callback(ip, tid, seoj, deoj, esv, opc, p.epc);
                }
            }
        }

        match esv {
            Esv::SetI | Esv::SetC => self.handle_set(ip, tid, seoj, deoj, esv, props).await,
            Esv::Get => self.handle_get(ip, tid, seoj, deoj, props).await,
            Esv::InfReq | Esv::SetGet => self.handle_inf_req(ip, tid, seoj, deoj, props).await,
            Esv::InfC => self.handle_infc(ip, tid, seoj, deoj, props).await,
            _ => {}
        }
    }

    fn invoke_get_callback(
        &self,
        ip: IpAddr,
        tid: u16,
        seoj: Eoj,
        deoj: Eoj,
        esv: Esv,
        opc: u8,
        epc: u8,
    ) {
        let value = self.read(deoj, epc).unwrap_or_default();
        if let Some(cb) = self.on_get.get() {
            cb(ip, tid, seoj, deoj, esv, opc, epc, &value);
        }
    }

    fn invoke_inf_callback(
        &self,
        ip: IpAddr,
        tid: u16,
        seoj: Eoj,
        deoj: Eoj,
        esv: Esv,
        opc: u8,
        epc: u8,
    ) {
        let value = self.read(deoj, epc).unwrap_or_default();
        if let Some(cb) = self.on_inf.get() {
            cb(ip, tid, seoj, deoj, esv, opc, epc, &value);
        }
    }

    fn read(&self, eoj: Eoj, epc: u8) -> Option<PropertyValue> {
        let inner = self.inner.lock().unwrap();
        let store = store_for(&inner, eoj)?;
        store.get(epc).cloned()
    }

    /// SETI/SETC: per EPC, absent property or a
    /// rejecting on-set callback is a failure that echoes the request
    /// value; a successful SET replies with PDC=0.
    async fn handle_set(&self, ip: IpAddr, tid: u16, seoj: Eoj, deoj: Eoj, esv: Esv, props: &[Property]) {
        let opc = props.len() as u8;
        let mut success = true;
        let mut reply_props = Vec::with_capacity(props.len());

        for p in props {
            let exists = self.read(deoj, p.epc).is_some();
            if !exists {
                success = false;
                reply_props.push(p.clone());
                continue;
            }
            let requested = PropertyValue::new(p.edt.clone());
            let cb = self.on_set.get().cloned();
            let accepted = match cb {
                Some(cb) => cb(ip, tid, seoj, deoj, esv, opc, p.epc, &requested),
                None => true,
            };
            if accepted {
                reply_props.push(Property::new(p.epc, Vec::new()));
            } else {
                success = false;
                reply_props.push(p.clone());
            }
        }

        if success && esv == Esv::SetI {
            // SETI silent success: no reply at all.
            return;
        }

        let reply_esv = match (esv, success) {
            (Esv::SetI, false) => Esv::SetISna,
            (Esv::SetC, false) => Esv::SetCSna,
            (_, true) => Esv::SetRes,
            _ => unreachable!(),
        };
        self.send_unicast_reply(ip, tid, deoj, seoj, reply_esv, reply_props)
            .await;
    }

    /// GET: absent properties get a PDC=0 placeholder and flip the
    /// reply to GET_SNA; otherwise GET_RES.
    async fn handle_get(&self, ip: IpAddr, tid: u16, seoj: Eoj, deoj: Eoj, props: &[Property]) {
        let (success, reply_props) = self.build_get_style_reply(deoj, props);
        let reply_esv = if success { Esv::GetRes } else { Esv::GetSna };
        self.send_unicast_reply(ip, tid, deoj, seoj, reply_esv, reply_props)
            .await;
    }

    /// INF_REQ (and the SETGET stub): full success multicasts an INF;
    /// any failure falls back to a unicast INF_SNA to the requester.
    async fn handle_inf_req(&self, ip: IpAddr, tid: u16, seoj: Eoj, deoj: Eoj, props: &[Property]) {
        let (success, reply_props) = self.build_get_style_reply(deoj, props);
        if success {
            self.send_multicast_reply(tid, deoj, seoj, Esv::Inf, reply_props)
                .await;
        } else {
            self.send_unicast_reply(ip, tid, deoj, seoj, Esv::InfSna, reply_props)
                .await;
        }
    }

    /// INFC: success replies INFC_RES, failure replies INF_SNA, both
    /// unicast to the requester.
    async fn handle_infc(&self, ip: IpAddr, tid: u16, seoj: Eoj, deoj: Eoj, props: &[Property]) {
        let (success, reply_props) = self.build_get_style_reply(deoj, props);
        let reply_esv = if success { Esv::InfCRes } else { Esv::InfSna };
        self.send_unicast_reply(ip, tid, deoj, seoj, reply_esv, reply_props)
            .await;
    }

    fn build_get_style_reply(&self, deoj: Eoj, props: &[Property]) -> (bool, Vec<Property>) {
        let mut success = true;
        let mut reply_props = Vec::with_capacity(props.len());
        for p in props {
            match self.read(deoj, p.epc) {
                Some(value) => reply_props.push(Property::new(p.epc, value.edt().to_vec())),
                None => {
                    success = false;
                    reply_props.push(Property::new(p.epc, Vec::new()));
                }
            }
        }
        (success, reply_props)
    }

    /// Mutate a property locally. Property-map EPCs (0x9D/0x9E/0x9F) treat
    /// `data` as the raw EPC list and re-encode via [`PropertyStore::set_map`];
    /// any other EPC treats `data` as the EDT and triggers autonomous INF
    /// emission when that EPC is in the object's INF map.
    pub async fn update(&self, eoj: Eoj, epc: u8, data: Vec<u8>) {
        let is_map_epc = matches!(epc, 0x9D | 0x9E | 0x9F);
        if is_map_epc {
            let kind = match epc {
                0x9D => MapKind::Inf,
                0x9E => MapKind::Set,
                _ => MapKind::Get,
            };
            let mut inner = self.inner.lock().unwrap();
            if let Some(store) = store_for_mut(&mut inner, eoj) {
                store.set_map(kind, data);
            }
            return;
        }

        let should_notify = {
            let mut inner = self.inner.lock().unwrap();
            match store_for_mut(&mut inner, eoj) {
                Some(store) => {
                    store.set_value(epc, data.clone());
                    store.has_inf(epc)
                }
                None => {
                    warn!("update() for unserved EOJ {eoj}");
                    return;
                }
            }
        };

        if should_notify {
            let value = PropertyValue::new(data);
            self.send_multicast_notify(eoj, epc, &value).await;
        }
    }

    fn next_tid(&self) -> u16 {
        let mut inner = self.inner.lock().unwrap();
        let tid = inner.tid;
        inner.tid = inner.tid.wrapping_add(1);
        tid
    }

    async fn send_unicast_reply(
        &self,
        ip: IpAddr,
        tid: u16,
        seoj: Eoj,
        deoj: Eoj,
        esv: Esv,
        props: Vec<Property>,
    ) {
        let frame = Frame::new(tid, seoj.to_bytes(), deoj.to_bytes(), esv, props);
        self.send_unicast(ip, &codec::encode(&frame)).await;
    }

    async fn send_multicast_reply(&self, tid: u16, seoj: Eoj, deoj: Eoj, esv: Esv, props: Vec<Property>) {
        let frame = Frame::new(tid, seoj.to_bytes(), deoj.to_bytes(), esv, props);
        self.send_multicast(&codec::encode(&frame)).await;
    }

    /// Autonomous single-OPC multicast INF, consuming a freshly allocated
    /// TID, allocated immediately before encoding.
    async fn send_multicast_notify(&self, eoj: Eoj, epc: u8, value: &PropertyValue) {
        let tid = self.next_tid();
        let frame = Frame::new(
            tid,
            eoj.to_bytes(),
            CONTROLLER.to_bytes(),
            Esv::Inf,
            vec![Property::new(epc, value.edt().to_vec())],
        );
        self.send_multicast(&codec::encode(&frame)).await;
    }

    /// Opens a transient UDP socket, sends once, closes.
    pub async fn send_unicast(&self, ip: IpAddr, bytes: &[u8]) {
        let addr = SocketAddr::new(ip, ECHONET_PORT);
        match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            Ok(sock) => {
                if let Err(e) = sock.send_to(bytes, addr).await {
                    error!("unicast send to {addr} failed: {e}");
                }
            }
            Err(e) => error!("failed to open transient unicast socket: {e}"),
        }
    }

    /// Sends to (224.0.23.0, 3610) via the node's selected interface.
    pub async fn send_multicast(&self, bytes: &[u8]) {
        let addr = SocketAddr::new(IpAddr::V4(MULTICAST_ADDR), ECHONET_PORT);
        match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            Ok(sock) => {
                if let Err(e) = sock.set_multicast_if_v4(&self.config.local_addr) {
                    error!("failed to select multicast egress interface: {e}");
                }
                if let Err(e) = sock.send_to(bytes, addr).await {
                    error!("multicast send failed: {e}");
                }
            }
            Err(e) => error!("failed to open transient multicast socket: {e}"),
        }
    }

    /// Query every configured device EOJ's INF/SET/GET property maps from a
    /// remote node.
    pub async fn send_get_property_map(&self, ip: IpAddr, eoj: Eoj) {
        let tid = self.next_tid();
        let epcs: &[u8] = if eoj.is_node_profile_alias() {
            &[0x83, 0x9D, 0x9E, 0x9F]
        } else {
            &[0x9D, 0x9E, 0x9F]
        };
        let props = epcs.iter().map(|&epc| Property::new(epc, Vec::new())).collect();
        let frame = Frame::new(tid, NODE_PROFILE.to_bytes(), eoj.to_bytes(), Esv::Get, props);
        self.send_unicast(ip, &codec::encode(&frame)).await;
    }
}

fn store_for(inner: &Inner, eoj: Eoj) -> Option<&PropertyStore> {
    if eoj.is_node_profile_alias() {
        Some(&inner.node_profile)
    } else {
        inner.devices.get(&eoj)
    }
}

fn store_for_mut(inner: &mut Inner, eoj: Eoj) -> Option<&mut PropertyStore> {
    if eoj.is_node_profile_alias() {
        Some(&mut inner.node_profile)
    } else {
        inner.devices.get_mut(&eoj)
    }
}

fn maker_code_bytes(maker_code: [u8; 3]) -> Vec<u8> {
    maker_code.to_vec()
}

/// EPC 0x83 identification-number layout: `FE, 00, 00, 77, mac[0..5],
/// eoj(3), 00, 00, 00, 00`.
fn identification_number(config: &NodeConfig, eoj: Eoj) -> Vec<u8> {
    let mut out = Vec::with_capacity(17);
    out.push(0xFE);
    out.extend_from_slice(&config.maker_code);
    out.extend_from_slice(&config.mac);
    out.extend_from_slice(&eoj.to_bytes());
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    out
}

fn bind_receive_socket(local_addr: Ipv4Addr) -> Result<UdpSocket, EchonetError> {
    use socket2::{Domain, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, ECHONET_PORT).into();
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_if_v4(&local_addr)?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(EchonetError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NodeConfig {
        NodeConfig::new(
            vec![Eoj::new(0x02, 0x90, 0x01)],
            Ipv4Addr::new(192, 168, 1, 10),
            [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
        )
    }

    #[test]
    fn constructor_prepopulates_node_profile() {
        let node = Node::new(test_config());
        let inner = node.inner.lock().unwrap();
        assert_eq!(inner.node_profile.get(0x80).unwrap().edt(), &[0x30]);
        assert_eq!(
            inner.node_profile.get(0x82).unwrap().edt(),
            &[0x01, 0x0D, 0x01, 0x00]
        );
        assert_eq!(inner.node_profile.get(0xD3).unwrap().edt(), &[0x00, 0x00, 0x01]);
        assert_eq!(
            inner.node_profile.get(0xD5).unwrap().edt(),
            &[0x01, 0x02, 0x90, 0x01]
        );
        assert_eq!(inner.node_profile.get(0xD7).unwrap().edt(), &[0x01, 0x02, 0x90]);
    }

    #[test]
    fn constructor_prepopulates_device_defaults() {
        let node = Node::new(test_config());
        let inner = node.inner.lock().unwrap();
        let store = inner.devices.get(&Eoj::new(0x02, 0x90, 0x01)).unwrap();
        assert_eq!(store.get(0x80).unwrap().edt(), &[0x30]);
        assert!(store.has_get(0x83));
        assert!(store.has_set(0x81));
        assert!(store.has_inf(0x88));
    }

    #[test]
    fn resolve_targets_expands_instance_zero() {
        let config = NodeConfig::new(
            vec![Eoj::new(0x02, 0x90, 0x01), Eoj::new(0x02, 0x90, 0x02)],
            Ipv4Addr::new(192, 168, 1, 10),
            [0u8; 6],
        );
        let node = Node::new(config);
        let mut targets = node.resolve_targets(Eoj::new(0x02, 0x90, 0x00));
        targets.sort();
        assert_eq!(
            targets,
            vec![Eoj::new(0x02, 0x90, 0x01), Eoj::new(0x02, 0x90, 0x02)]
        );
    }

    #[test]
    fn resolve_targets_node_profile_alias_is_single_object() {
        let node = Node::new(test_config());
        for instance in [0x00, 0x01, 0x02] {
            assert_eq!(
                node.resolve_targets(Eoj::new(0x0E, 0xF0, instance)),
                vec![NODE_PROFILE]
            );
        }
    }

    #[test]
    fn verify_rejects_unserved_eoj() {
        let node = Node::new(test_config());
        let bytes = [
            0x10, 0x81, 0x00, 0x01, 0x05, 0xFF, 0x01, 0x03, 0x90, 0x01, 0x62, 0x01, 0x80, 0x00,
        ];
        assert!(!node.verify(&bytes));
    }

    #[test]
    fn verify_accepts_served_eoj_with_valid_walk() {
        let node = Node::new(test_config());
        let bytes = [
            0x10, 0x81, 0x00, 0x01, 0x05, 0xFF, 0x01, 0x02, 0x90, 0x01, 0x62, 0x01, 0x80, 0x00,
        ];
        assert!(node.verify(&bytes));
    }

    #[test]
    fn next_tid_wraps_from_ffff_to_zero() {
        let node = Node::new(test_config());
        {
            let mut inner = node.inner.lock().unwrap();
            inner.tid = 0xFFFF;
        }
        assert_eq!(node.next_tid(), 0xFFFF);
        assert_eq!(node.next_tid(), 0x0000);
    }

    #[test]
    fn build_get_style_reply_flags_missing_epc_and_echoes_present_one() {
        let node = Node::new(test_config());
        let deoj = Eoj::new(0x02, 0x90, 0x01);
        let props = vec![Property::new(0x80, Vec::new()), Property::new(0xFF, Vec::new())];
        let (success, reply) = node.build_get_style_reply(deoj, &props);
        assert!(!success);
        assert_eq!(reply[0], Property::new(0x80, vec![0x30]));
        assert_eq!(reply[1], Property::new(0xFF, Vec::new()));
    }

    #[test]
    fn is_served_matches_node_profile_and_configured_devices() {
        let node = Node::new(test_config());
        assert!(node.is_served(NODE_PROFILE));
        assert!(node.is_served(Eoj::new(0x02, 0x90, 0x01)));
        assert!(!node.is_served(Eoj::new(0x02, 0x91, 0x01)));
    }
}
