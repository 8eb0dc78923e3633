// ABOUTME: Shared helpers for triton-auth integration tests.
// ABOUTME: Fixture loading, header parsing, and a fake SSH agent on a Unix socket.

#![allow(dead_code)]

use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use ssh_encoding::{Decode, Encode};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

pub const RSA_PEM: &str = include_str!("../fixtures/rsa2048.pem");
pub const RSA_PUB: &str = include_str!("../fixtures/rsa2048.pub");
pub const RSA_FINGERPRINT: &str = "fe:64:fc:2c:5b:5d:ff:7c:79:7f:11:d3:6e:b6:f6:6b";

pub const OTHER_RSA_PUB: &str = include_str!("../fixtures/rsa_other.pub");
pub const OTHER_RSA_FINGERPRINT: &str = "5f:17:78:ec:7a:ca:02:44:51:ce:97:bb:cb:7d:6c:fc";

pub const EC256_PEM: &str = include_str!("../fixtures/ec256.pem");
pub const EC256_PUB: &str = include_str!("../fixtures/ec256.pub");
pub const EC256_FINGERPRINT: &str = "55:79:38:9c:c8:1d:73:c5:d7:dc:ec:c1:41:dd:d3:5d";

pub const EC384_OPENSSH: &str = include_str!("../fixtures/ec384_openssh");
pub const EC384_PUB: &str = include_str!("../fixtures/ec384.pub");
pub const EC384_FINGERPRINT: &str = "1d:c7:9e:dc:17:79:63:c3:cd:75:d9:37:4f:8c:e2:eb";

pub const EC521_PEM: &str = include_str!("../fixtures/ec521.pem");
pub const EC521_PUB: &str = include_str!("../fixtures/ec521.pub");
pub const EC521_FINGERPRINT: &str = "c0:70:ef:fd:4f:92:16:cb:84:88:14:24:60:af:69:95";

pub const TEST_DATE: &str = "Tue, 15 Nov 1994 08:12:31 GMT";

/// Decode the key blob from an OpenSSH `.pub` line.
pub fn public_blob(line: &str) -> Vec<u8> {
    let encoded = line.split_whitespace().nth(1).expect("pub line has a blob");
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .expect("blob should be base64")
}

/// Split a buffer of consecutive SSH strings.
pub fn ssh_strings(mut buf: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        out.push(Vec::<u8>::decode(&mut buf).expect("buffer holds SSH strings"));
    }
    out
}

/// Extract one `name="value"` field from an Authorization header.
pub fn header_field<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    header
        .strip_prefix("Signature ")?
        .split(',')
        .find_map(|part| {
            let (name, value) = part.split_once('=')?;
            (name == field).then(|| value.trim_matches('"'))
        })
}

/// Base64-decoded signature from an Authorization header.
pub fn header_signature(header: &str) -> Vec<u8> {
    let encoded = header_field(header, "signature").expect("header has a signature");
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .expect("signature should be base64")
}

pub fn rsa_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(RSA_PEM).expect("fixture RSA key should parse")
}

/// A key the fake agent advertises.
pub struct AgentKey {
    pub blob: Vec<u8>,
    pub comment: String,
    /// Private half, if the agent can really sign with this key.
    pub private: Option<RsaPrivateKey>,
}

impl AgentKey {
    pub fn public_only(pub_line: &str, comment: &str) -> Self {
        Self {
            blob: public_blob(pub_line),
            comment: comment.to_string(),
            private: None,
        }
    }

    pub fn with_rsa(pub_line: &str, comment: &str, private: RsaPrivateKey) -> Self {
        Self {
            private: Some(private),
            ..Self::public_only(pub_line, comment)
        }
    }
}

/// Minimal SSH agent serving list-keys and sign requests over a Unix socket.
///
/// Every sign request's key blob is recorded so tests can assert which key
/// was used.
pub struct FakeAgent {
    pub socket: PathBuf,
    signed_blobs: Arc<Mutex<Vec<Vec<u8>>>>,
    _dir: TempDir,
}

impl FakeAgent {
    /// Start an agent that answers sign requests with `signature_format`.
    pub fn start(keys: Vec<AgentKey>, signature_format: &'static str) -> Self {
        Self::start_with_limit(keys, signature_format, None)
    }

    /// Like [`FakeAgent::start`], but each connection is closed after
    /// `max_requests` requests.
    pub fn start_with_limit(
        keys: Vec<AgentKey>,
        signature_format: &'static str,
        max_requests: Option<usize>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let socket = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&socket).expect("should bind agent socket");

        let keys = Arc::new(keys);
        let signed_blobs = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&signed_blobs);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let keys = Arc::clone(&keys);
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || {
                    serve(stream, &keys, &recorded, signature_format, max_requests)
                });
            }
        });

        Self {
            socket,
            signed_blobs,
            _dir: dir,
        }
    }

    /// Key blobs of every sign request received so far.
    pub fn signed_blobs(&self) -> Vec<Vec<u8>> {
        self.signed_blobs.lock().unwrap().clone()
    }
}

fn serve(
    mut stream: UnixStream,
    keys: &[AgentKey],
    recorded: &Mutex<Vec<Vec<u8>>>,
    signature_format: &str,
    max_requests: Option<usize>,
) {
    let mut handled = 0;
    loop {
        if max_requests.is_some_and(|max| handled >= max) {
            return;
        }

        let mut prefix = [0u8; 4];
        if stream.read_exact(&mut prefix).is_err() {
            return;
        }
        let len = u32::decode(&mut prefix.as_slice()).expect("four bytes hold a length");
        let mut body = vec![0u8; len as usize];
        if stream.read_exact(&mut body).is_err() {
            return;
        }
        handled += 1;

        let reply = match body[0] {
            11 => identities_answer(keys),
            13 => sign_response(&body[1..], keys, recorded, signature_format),
            _ => vec![5],
        };

        let mut framed = Vec::new();
        reply.encode(&mut framed).expect("should frame reply");
        if stream.write_all(&framed).is_err() {
            return;
        }
    }
}

fn identities_answer(keys: &[AgentKey]) -> Vec<u8> {
    let mut reply = vec![12];
    (keys.len() as u32).encode(&mut reply).unwrap();
    for key in keys {
        key.blob.encode(&mut reply).unwrap();
        key.comment.encode(&mut reply).unwrap();
    }
    reply
}

fn sign_response(
    request: &[u8],
    keys: &[AgentKey],
    recorded: &Mutex<Vec<Vec<u8>>>,
    signature_format: &str,
) -> Vec<u8> {
    let mut reader = request;
    let blob = Vec::<u8>::decode(&mut reader).expect("request has a key blob");
    let data = Vec::<u8>::decode(&mut reader).expect("request has data");
    assert_eq!(u32::decode(&mut reader).expect("request has flags"), 0);
    recorded.lock().unwrap().push(blob.clone());

    let Some(key) = keys.iter().find(|k| k.blob == blob) else {
        return vec![5];
    };

    let raw = match &key.private {
        Some(private) => private
            .sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(&data))
            .expect("fake agent should sign"),
        None => b"opaque-signature".to_vec(),
    };

    let mut signature = Vec::new();
    signature_format.encode(&mut signature).unwrap();
    raw.encode(&mut signature).unwrap();

    let mut reply = vec![14];
    signature.encode(&mut reply).unwrap();
    reply
}
