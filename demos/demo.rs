//! Rampart — Interactive Demo
//!
//! Run with: `cargo run --example demo`
//! (set `RUST_LOG=rampart=trace` to watch the handshake steps)
//!
//! Walks through the channel API end to end: factory setup, the handshake
//! byte loop, record geometry, encrypt/decrypt roundtrips, tamper behavior
//! on both transports, and orderly shutdown. Both peers live in this
//! process; every byte moves through plain buffers.

use std::time::Instant;

use rampart::{Channel, ChannelFactory, Identity, Transport};

use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509NameBuilder, X509};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║            Rampart — TLS/DTLS Secure Channel Demo              ║");
    println!("║        transform-based sessions, no sockets anywhere           ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    demo_handshake(Transport::Stream);
    demo_handshake(Transport::Datagram);
    demo_record_geometry();
    demo_roundtrip_scaling();
    demo_tamper_behavior();
    demo_shutdown();

    println!("\n✓ All demos passed.");
}

// ---------------------------------------------------------------------------

fn section(title: &str) {
    println!("\n┌─────────────────────────────────────────────────────────────────┐");
    println!("│ {:<63} │", title);
    println!("└─────────────────────────────────────────────────────────────────┘");
}

fn demo_identity() -> Identity {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "demo.rampart.local").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(7).unwrap()).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    Identity::from_pkcs8(
        builder.build().to_pem().unwrap(),
        key.private_key_to_pem_pkcs8().unwrap(),
    )
    .unwrap()
}

fn make_pair(transport: Transport) -> (Channel, Channel) {
    let client = ChannelFactory::client(transport)
        .no_certificate_check()
        .build()
        .unwrap()
        .make_channel()
        .unwrap();
    let server = ChannelFactory::server(transport)
        .identity(demo_identity())
        .build()
        .unwrap()
        .make_channel()
        .unwrap();
    (client, server)
}

fn connect(client: &mut Channel, server: &mut Channel, verbose: bool) {
    let mut buf = [0u8; 8192];
    let (_, n) = client.handshake(&[], &mut buf).unwrap();
    let mut flight = buf[..n].to_vec();
    let mut round = 1;

    while !flight.is_empty() {
        if verbose {
            println!("  round {}: client → server  {:>5} bytes", round, flight.len());
        }
        let (_, n) = server.handshake(&flight, &mut buf).unwrap();
        let reply = buf[..n].to_vec();
        if verbose && !reply.is_empty() {
            println!("  round {}: server → client  {:>5} bytes", round, reply.len());
        }

        let (_, n) = client.handshake(&reply, &mut buf).unwrap();
        flight = buf[..n].to_vec();
        round += 1;
    }
}

// ---------------------------------------------------------------------------

fn demo_handshake(transport: Transport) {
    match transport {
        Transport::Stream => section("1. TLS Handshake (stream transport)"),
        Transport::Datagram => section("2. DTLS Handshake (datagram transport)"),
    }

    let (mut client, mut server) = make_pair(transport);
    let t = Instant::now();
    connect(&mut client, &mut server, true);
    let elapsed = t.elapsed();

    println!("  connected: client={} server={}  in {:?}",
        client.is_connected(), server.is_connected(), elapsed);

    let peer = client.peer_certificate().unwrap();
    let cn = peer.subject_filtered(rampart::oid::COMMON_NAME).unwrap();
    println!("  server presented: CN={}", cn[0].1);
    println!("  fingerprint (SHA-256): {}…",
        hex::encode(&peer.digest::<rampart::Sha256>().unwrap()[..12]));
}

fn demo_record_geometry() {
    section("3. Record Geometry");

    for transport in [Transport::Stream, Transport::Datagram] {
        let (mut client, mut server) = make_pair(transport);
        connect(&mut client, &mut server, false);
        let sizes = client.record_sizes().unwrap();
        println!(
            "  {:?}: header {:>2} B, trailer bound {} B, max message {} B",
            transport, sizes.header, sizes.trailer, sizes.max_message
        );
    }
}

fn demo_roundtrip_scaling() {
    section("4. Encrypt → Decrypt Across Payload Sizes (stream)");

    let (mut client, mut server) = make_pair(Transport::Stream);
    connect(&mut client, &mut server, false);

    println!("  {:>10}  {:>12}  {:>10}  {:>10}", "Plaintext", "Ciphertext", "Encrypt", "Decrypt");

    for size in [64usize, 1024, 16 * 1024, 64 * 1024] {
        let message = vec![0xabu8; size];
        let mut wire = vec![0u8; size + 8192];
        let mut plain = vec![0u8; size + 8192];

        let t = Instant::now();
        let (_, produced) = client.encrypt(&message, &mut wire).unwrap();
        let enc = t.elapsed();

        let t = Instant::now();
        let mut assembled = Vec::with_capacity(size);
        let mut fed = 0;
        while assembled.len() < size {
            let (consumed, n) = server.decrypt(&wire[fed..produced], &mut plain).unwrap();
            fed += consumed;
            assembled.extend_from_slice(&plain[..n]);
        }
        let dec = t.elapsed();

        assert_eq!(assembled, message);
        println!("  {:>10}  {:>12}  {:>10.2?}  {:>10.2?}", size, produced, enc, dec);
    }
}

fn demo_tamper_behavior() {
    section("5. Tampered Records: stream aborts, datagram drops");

    for transport in [Transport::Stream, Transport::Datagram] {
        let (mut client, mut server) = make_pair(transport);
        connect(&mut client, &mut server, false);

        let mut wire = [0u8; 4096];
        let (_, n) = client.encrypt(b"bit flips incoming", &mut wire).unwrap();
        for byte in wire[..n].iter_mut() {
            *byte ^= 0xff;
        }

        let mut plain = [0u8; 4096];
        match server.decrypt(&wire[..n], &mut plain) {
            Ok((_, produced)) => {
                println!("  {:?}: dropped silently ({} plaintext bytes), still connected: {}",
                    transport, produced, server.is_connected());
            }
            Err(e) => {
                println!("  {:?}: fatal ({}), state {:?}", transport, e, server.state());
            }
        }
    }
}

fn demo_shutdown() {
    section("6. Orderly Shutdown");

    let (mut client, mut server) = make_pair(Transport::Stream);
    connect(&mut client, &mut server, false);

    let mut wire = [0u8; 4096];
    let n = client.shutdown(&mut wire).unwrap();
    println!("  close notification: {} bytes", n);

    let mut plain = [0u8; 4096];
    let (_, produced) = server.decrypt(&wire[..n], &mut plain).unwrap();
    println!("  server received it: {} plaintext bytes, state {:?}", produced, server.state());

    let err = server.decrypt(&[], &mut plain).unwrap_err();
    println!("  further reads: {}", err);
}
