// ABOUTME: SSH agent client and the agent-delegated signer.
// ABOUTME: Lists agent keys, selects one by MD5 fingerprint, and asks the agent to sign.

use crate::error::{AuthError, Result};
use crate::fingerprint::Fingerprint;
use crate::signer::{signing_string, KeyId, Signer, SignerIdentity, SigningAlgorithm};
use base64::Engine;
use ssh_encoding::{Decode, Encode, Reader};
use ssh_key::public::KeyData;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, trace, warn};

const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
const SSH_AGENT_SIGN_RESPONSE: u8 = 14;

/// Largest agent reply accepted, matching OpenSSH's limit.
const MAX_MESSAGE_LEN: usize = 256 * 1024;

/// Signature format tag for legacy RSA signatures (PKCS#1 v1.5 over SHA-1).
const SSH_RSA_FORMAT: &str = "ssh-rsa";

/// A public key held by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    /// SSH wire encoding of the public key.
    pub key_blob: Vec<u8>,
    pub comment: String,
}

impl AgentIdentity {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_public_blob(&self.key_blob)
    }

    /// Decoded public key, if the blob is a key type `ssh-key` understands.
    pub fn public_key(&self) -> Option<KeyData> {
        KeyData::decode(&mut self.key_blob.as_slice()).ok()
    }

    /// Algorithm name of the key, e.g. `ssh-rsa`.
    pub fn key_type(&self) -> Option<String> {
        self.public_key().map(|key| key.algorithm().to_string())
    }
}

impl Decode for AgentIdentity {
    type Error = ssh_encoding::Error;

    fn decode(reader: &mut impl Reader) -> ssh_encoding::Result<Self> {
        let key_blob = Vec::<u8>::decode(reader)?;
        let comment = String::from_utf8_lossy(&Vec::<u8>::decode(reader)?).into_owned();
        Ok(Self { key_blob, comment })
    }
}

/// Signature returned by the agent: a format tag plus the raw signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSignature {
    pub format: String,
    pub blob: Vec<u8>,
}

impl Decode for AgentSignature {
    type Error = ssh_encoding::Error;

    fn decode(reader: &mut impl Reader) -> ssh_encoding::Result<Self> {
        reader.read_prefixed(|signature| {
            Ok(Self {
                format: String::from_utf8_lossy(&Vec::<u8>::decode(signature)?).into_owned(),
                blob: Vec::<u8>::decode(signature)?,
            })
        })
    }
}

/// Request/response client for the SSH agent protocol.
///
/// Requests must not interleave on one connection, so callers sharing a
/// client need to serialize access. After an I/O failure the client refuses
/// further requests; the framing state of the stream is unknown.
#[derive(Debug)]
pub struct AgentClient<S> {
    stream: S,
    broken: bool,
}

impl AgentClient<UnixStream> {
    /// Connect to an agent listening on a Unix socket.
    ///
    /// # Errors
    /// Returns `AuthError::AgentConnect` if the socket cannot be opened.
    pub fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(|e| AuthError::AgentConnect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(socket = %path.display(), "connected to SSH agent");
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> AgentClient<S> {
    /// Wrap an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            broken: false,
        }
    }

    /// Ask the agent for every public key it holds.
    ///
    /// # Errors
    /// Returns an error on I/O failure or a malformed reply.
    pub fn list_identities(&mut self) -> Result<Vec<AgentIdentity>> {
        let reply = self.round_trip(&[SSH_AGENTC_REQUEST_IDENTITIES])?;
        let mut reader = reply.as_slice();
        expect_message(&mut reader, SSH_AGENT_IDENTITIES_ANSWER, "list keys")?;

        let count = u32::decode(&mut reader).map_err(malformed)?;
        (0..count)
            .map(|_| AgentIdentity::decode(&mut reader).map_err(malformed))
            .collect()
    }

    /// Ask the agent to sign `data` with the key whose public blob is `key_blob`.
    ///
    /// No signature flags are sent, so RSA keys answer with `ssh-rsa`.
    ///
    /// # Errors
    /// Returns an error on I/O failure, refusal, or a malformed reply.
    pub fn sign(&mut self, key_blob: &[u8], data: &[u8]) -> Result<AgentSignature> {
        let mut request = Vec::new();
        SSH_AGENTC_SIGN_REQUEST
            .encode(&mut request)
            .and_then(|()| key_blob.encode(&mut request))
            .and_then(|()| data.encode(&mut request))
            .and_then(|()| 0u32.encode(&mut request))
            .map_err(unencodable)?;

        let reply = self.round_trip(&request)?;
        let mut reader = reply.as_slice();
        expect_message(&mut reader, SSH_AGENT_SIGN_RESPONSE, "sign")?;
        AgentSignature::decode(&mut reader).map_err(malformed)
    }

    fn round_trip(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        if self.broken {
            return Err(AuthError::AgentConnectionLost);
        }
        let result = self.exchange(request);
        if matches!(result, Err(AuthError::AgentIo(_))) {
            warn!("SSH agent connection failed; signer is no longer usable");
            self.broken = true;
        }
        result
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let mut framed = Vec::with_capacity(request.len() + 4);
        request.encode(&mut framed).map_err(unencodable)?;
        self.stream.write_all(&framed).map_err(AuthError::AgentIo)?;
        self.stream.flush().map_err(AuthError::AgentIo)?;

        let mut prefix = [0u8; 4];
        self.stream
            .read_exact(&mut prefix)
            .map_err(AuthError::AgentIo)?;
        let len = u32::decode(&mut prefix.as_slice()).map_err(malformed)? as usize;
        if len == 0 || len > MAX_MESSAGE_LEN {
            self.broken = true;
            return Err(AuthError::AgentProtocol(format!(
                "invalid reply length {len}"
            )));
        }

        let mut reply = vec![0u8; len];
        self.stream
            .read_exact(&mut reply)
            .map_err(AuthError::AgentIo)?;
        Ok(reply)
    }
}

/// Consume the message type byte, mapping an agent refusal to an error.
fn expect_message(reader: &mut &[u8], expected: u8, operation: &str) -> Result<()> {
    match u8::decode(reader).map_err(malformed)? {
        t if t == expected => Ok(()),
        SSH_AGENT_FAILURE => Err(AuthError::AgentProtocol(format!(
            "agent refused {operation} request"
        ))),
        other => Err(AuthError::AgentProtocol(format!(
            "unexpected reply type {other} to {operation} request"
        ))),
    }
}

fn malformed(e: ssh_encoding::Error) -> AuthError {
    AuthError::AgentProtocol(format!("malformed agent reply: {e}"))
}

fn unencodable(e: ssh_encoding::Error) -> AuthError {
    AuthError::AgentProtocol(format!("cannot encode agent request: {e}"))
}

/// Signs requests by delegating to a running SSH agent.
///
/// The private key never enters this process. The agent connection is
/// opened once and guarded by a mutex, so concurrent `sign` calls are
/// serialized. A failed connection is not re-established.
#[derive(Debug)]
pub struct SshAgentSigner {
    client: Mutex<AgentClient<UnixStream>>,
    key: AgentIdentity,
    identity: SignerIdentity,
}

impl SshAgentSigner {
    /// Connect to the agent and select the key named by `key_fingerprint`.
    ///
    /// `agent_socket` is the configured socket path; `None` means no agent
    /// is available.
    ///
    /// # Errors
    /// - `AuthError::AgentUnavailable` if no socket is configured
    /// - `AuthError::AgentConnect` if the socket cannot be opened
    /// - `AuthError::KeyNotFoundInAgent` if no agent key has that fingerprint
    pub fn new(
        agent_socket: Option<&Path>,
        key_fingerprint: &str,
        account: &str,
        user: Option<&str>,
    ) -> Result<Self> {
        let socket = agent_socket.ok_or(AuthError::AgentUnavailable)?;
        let mut client = AgentClient::connect(socket)?;

        let identities = client.list_identities()?;
        debug!(count = identities.len(), "SSH agent listed keys");

        let key = identities
            .into_iter()
            .find(|identity| identity.fingerprint().matches(key_fingerprint))
            .ok_or_else(|| {
                warn!(fingerprint = %key_fingerprint, "key not found in SSH agent");
                AuthError::KeyNotFoundInAgent {
                    fingerprint: key_fingerprint.to_string(),
                }
            })?;

        let fingerprint = key.fingerprint();
        debug!(
            fingerprint = %fingerprint,
            comment = %key.comment,
            "selected SSH agent key"
        );

        Ok(Self {
            client: Mutex::new(client),
            identity: SignerIdentity {
                key_id: KeyId::new(account, user, &fingerprint),
                algorithm: SigningAlgorithm::RsaSha1,
            },
            key,
        })
    }

    /// Identity embedded in every signed request.
    pub fn identity(&self) -> &SignerIdentity {
        &self.identity
    }

    /// `keyId` sent in the `Authorization` header.
    pub fn key_id(&self) -> &KeyId {
        &self.identity.key_id
    }

    /// The agent key this signer delegates to.
    pub fn agent_key(&self) -> &AgentIdentity {
        &self.key
    }
}

impl Signer for SshAgentSigner {
    fn sign(&self, date_header: &str) -> Result<String> {
        let data = signing_string(date_header);
        let signature = {
            let mut client = self
                .client
                .lock()
                .map_err(|_| AuthError::AgentConnectionLost)?;
            client.sign(&self.key.key_blob, data.as_bytes())?
        };

        if signature.format != SSH_RSA_FORMAT {
            return Err(AuthError::UnsupportedAgentAlgorithm(signature.format));
        }
        trace!(len = signature.blob.len(), "SSH agent signed request");

        let encoded = base64::engine::general_purpose::STANDARD.encode(&signature.blob);
        Ok(self.identity.authorization(&encoded))
    }

    fn key_fingerprint(&self) -> &str {
        self.identity.key_id.fingerprint()
    }
}
