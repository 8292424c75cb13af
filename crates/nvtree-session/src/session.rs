use std::sync::Arc;

use nvtree_codec::{
    lite_find, lite_update, pack_into, unpack, ChecksumWord, CodecError, Envelope, TableHeader,
    TABLE_HEADER_SIZE,
};
use nvtree_crypto::{AssetCipher, Blake3AssetCipher, ASSET_ID, IMAGE_NONCE};
use nvtree_store::{lock, BackendFactory};
use nvtree_tree::{NodeId, Tree, TreeError};
use nvtree_types::{BackendKind, FormatVersion, ItemKind, KeyClass, PathToken, Value};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::device::Devices;
use crate::error::{SessionError, SessionResult};
use crate::image::{commit_image, erase_region, read_image};

/// Secret used when no device secret is configured.
const UNPROVISIONED: &str = "nvtree-unprovisioned-device";

/// Lifecycle state of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Loaded,
    Mutating,
    Saved,
    Closed,
}

use SessionState::*;

/// States in which the pool and tree exist.
const OPEN: [SessionState; 4] = [Initialized, Loaded, Mutating, Saved];

/// Outcome of [`Session::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// The device holds no image; the tree is empty.
    Blank,
    Loaded {
        items: usize,
        /// A legacy image was re-sealed with a checksum first.
        migrated: bool,
    },
}

/// Result of a lite lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteHit {
    pub name: String,
    pub kind: ItemKind,
    /// Length word value: payload bytes, or subtree bytes for a group.
    pub len: u32,
    pub value: Option<Value>,
}

/// Verified plaintext image currently held in the pool.
#[derive(Clone, Copy, Debug)]
struct PoolImage {
    kind: BackendKind,
    unit: u32,
    format: FormatVersion,
    total_len: u32,
    key: Option<KeyClass>,
}

impl PoolImage {
    fn payload_range(&self) -> std::ops::Range<usize> {
        TABLE_HEADER_SIZE..TABLE_HEADER_SIZE + self.total_len as usize
    }
}

/// One editing session over a persisted item tree.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    tree: Tree,
    /// Header plus payload; allocated once by `init`.
    pool: Vec<u8>,
    pool_image: Option<PoolImage>,
    devices: Devices,
    cipher: Arc<dyn AssetCipher>,
    update_count: u32,
}

impl Session {
    /// Create an uninitialized session. Nothing is allocated or opened yet.
    pub fn new(config: SessionConfig, factory: Arc<dyn BackendFactory>) -> SessionResult<Self> {
        config.validate()?;
        let cipher: Arc<dyn AssetCipher> = match &config.device_secret {
            Some(secret) => Arc::new(Blake3AssetCipher::from_hex(secret)?),
            None => Arc::new(Blake3AssetCipher::from_passphrase(UNPROVISIONED)),
        };
        Ok(Self {
            tree: Tree::new(config.format, 0),
            pool: Vec::new(),
            pool_image: None,
            devices: Devices::new(factory, config.wakeup_retries),
            cipher,
            update_count: 0,
            state: Uninitialized,
            config,
        })
    }

    /// Replace the asset cipher.
    pub fn with_cipher(mut self, cipher: Arc<dyn AssetCipher>) -> Self {
        self.cipher = cipher;
        self.tree.set_capacity(self.tree_capacity());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn require(&self, op: &'static str, allowed: &[SessionState]) -> SessionResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Payload bytes the tree may use: the pool minus header and any
    /// encryption framing.
    fn tree_capacity(&self) -> u32 {
        let framing = match self.config.secure {
            Some(_) => self.cipher.overhead() as u32,
            None => 0,
        };
        self.config
            .pool_size
            .saturating_sub(TABLE_HEADER_SIZE as u32 + framing)
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Allocate the pool and create an empty tree.
    pub fn init(&mut self) -> SessionResult<()> {
        self.require("init", &[Uninitialized, Closed])?;
        let size = self.config.pool_size as usize;
        let mut pool = Vec::new();
        pool.try_reserve_exact(size)
            .map_err(|_| SessionError::AllocationFailure(size))?;
        pool.resize(size, 0);
        self.pool = pool;
        self.tree = Tree::new(self.config.format, self.tree_capacity());
        self.pool_image = None;
        self.state = Initialized;
        info!(pool_size = size, format = ?self.config.format, "session initialized");
        Ok(())
    }

    /// Replace the tree with the image stored on `(kind, unit)`.
    ///
    /// A device without an image yields [`LoadStatus::Blank`] and an empty
    /// tree in the configured layout. A stored image keeps the layout it
    /// was written in. An image without a checksum is re-sealed in place
    /// once before it is parsed. On any failure the tree is left empty and
    /// the state is unchanged.
    pub fn load(&mut self, kind: BackendKind, unit: u32) -> SessionResult<LoadStatus> {
        self.require("load", &OPEN)?;
        let fetched = match self.fetch(kind, unit) {
            Ok(fetched) => fetched,
            Err(err) => {
                if let Err(clear) = self.tree.reset(self.config.format) {
                    warn!(error = %clear, "could not discard tree");
                }
                return Err(err);
            }
        };
        let status = match fetched {
            None => {
                self.tree.reset(self.config.format)?;
                info!(%kind, unit, "no image on device");
                LoadStatus::Blank
            }
            Some((image, migrated)) => {
                let items = unpack(&self.pool[image.payload_range()], image.format, &mut self.tree)?;
                info!(%kind, unit, items, total = image.total_len, migrated, "image loaded");
                LoadStatus::Loaded { items, migrated }
            }
        };
        self.state = Loaded;
        Ok(status)
    }

    /// Pack the tree and commit it to `(kind, unit)`.
    pub fn save(&mut self, kind: BackendKind, unit: u32) -> SessionResult<()> {
        self.require("save", &OPEN)?;
        let total = pack_into(&self.tree, &mut self.pool[TABLE_HEADER_SIZE..])?;
        let target = PoolImage {
            kind,
            unit,
            format: self.tree.format(),
            total_len: total as u32,
            key: self.config.secure,
        };
        self.pool_image = None;
        self.commit_pool(target)?;
        self.state = Saved;
        Ok(())
    }

    /// Wipe the image region on `(kind, unit)` and start over with an
    /// empty tree.
    pub fn erase(&mut self, kind: BackendKind, unit: u32) -> SessionResult<()> {
        self.require("erase", &OPEN)?;
        let base = self.config.bases.get(kind);
        let chunk = self.config.commit_chunk;
        let len = self.config.pool_size;
        {
            let binding = self.devices.acquire(kind, unit)?;
            let probe = binding.probe;
            let mut dev = lock(&binding.device)?;
            erase_region(&mut **dev, base, chunk, probe, len)?;
        }
        self.update_count = self.update_count.wrapping_add(1);
        self.pool_image = None;
        self.tree.reset(self.config.format)?;
        self.state = Initialized;
        info!(%kind, unit, base, len, "image erased");
        Ok(())
    }

    /// Release the tree, the pool and every device binding.
    pub fn close(&mut self) {
        self.pool = Vec::new();
        self.tree = Tree::new(self.config.format, 0);
        self.pool_image = None;
        self.devices.release();
        self.state = Closed;
        debug!("session closed");
    }

    // ---------------------------------------------------------------
    // Tree commands
    // ---------------------------------------------------------------

    /// Create `name` under `parent` (the root when `None`), optionally
    /// with an initial value.
    ///
    /// If a child of that name already exists it is returned unchanged.
    pub fn add(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        kind: ItemKind,
        value: Option<&Value>,
    ) -> SessionResult<NodeId> {
        self.require("add", &OPEN)?;
        let parent = parent.unwrap_or(self.tree.root());
        self.tree.item(parent)?;
        if let Some(existing) = self.tree.find_child(parent, PathToken::Exact(name)) {
            debug!(name, "item exists, returning it");
            return Ok(existing);
        }
        let id = self.tree.add(parent, name, kind)?;
        if let Some(value) = value {
            let filled = check_kind(&self.tree, id, value)
                .and_then(|()| self.tree.fill(id, &value.to_payload()).map_err(Into::into));
            if let Err(err) = filled {
                self.tree.delete(id)?;
                return Err(err);
            }
        }
        self.state = Mutating;
        Ok(id)
    }

    /// [`add`](Self::add) directly under the root.
    pub fn root(&mut self, name: &str, kind: ItemKind, value: Option<&Value>) -> SessionResult<NodeId> {
        self.add(None, name, kind, value)
    }

    pub fn add_group(&mut self, parent: Option<NodeId>, name: &str) -> SessionResult<NodeId> {
        self.add(parent, name, ItemKind::Group, None)
    }

    /// Add a leaf sized exactly for `value`.
    pub fn add_value(&mut self, parent: Option<NodeId>, name: &str, value: Value) -> SessionResult<NodeId> {
        let kind = value.kind().map_err(TreeError::from)?;
        self.add(parent, name, kind, Some(&value))
    }

    /// Delete an item and its subtree.
    pub fn del(&mut self, node: NodeId) -> SessionResult<()> {
        self.require("del", &OPEN)?;
        self.tree.delete(node)?;
        self.state = Mutating;
        Ok(())
    }

    /// Delete the item at `path`.
    pub fn del_path(&mut self, path: &str) -> SessionResult<()> {
        let (id, _) = self.find(path)?;
        self.del(id)
    }

    /// Delete every child of `node` (the root when `None`).
    pub fn clear(&mut self, node: Option<NodeId>) -> SessionResult<usize> {
        self.require("clear", &OPEN)?;
        let removed = self.tree.clear(node.unwrap_or(self.tree.root()))?;
        self.state = Mutating;
        Ok(removed)
    }

    /// Resolve a dotted path from the root. Returns the item and its length.
    pub fn find(&self, path: &str) -> SessionResult<(NodeId, u32)> {
        self.find_from(self.tree.root(), path)
    }

    pub fn find_from(&self, from: NodeId, path: &str) -> SessionResult<(NodeId, u32)> {
        self.require("find", &OPEN)?;
        let id = self.tree.find(from, path)?;
        Ok((id, self.tree.item(id)?.len()))
    }

    pub fn read(&self, node: NodeId) -> SessionResult<Option<Value>> {
        self.require("read", &OPEN)?;
        Ok(self.tree.read(node)?)
    }

    /// Set a leaf's value in its current slot; text may only shrink.
    pub fn fill(&mut self, node: NodeId, value: &Value) -> SessionResult<()> {
        self.require("fill", &OPEN)?;
        check_kind(&self.tree, node, value)?;
        self.tree.fill(node, &value.to_payload())?;
        self.state = Mutating;
        Ok(())
    }

    /// Set a leaf's value; text may grow within the budget.
    pub fn write(&mut self, node: NodeId, value: &Value) -> SessionResult<()> {
        self.require("write", &OPEN)?;
        check_kind(&self.tree, node, value)?;
        self.tree.write(node, &value.to_payload())?;
        self.state = Mutating;
        Ok(())
    }

    /// Render `node` (the root when `None`) and everything below it.
    pub fn print(&self, node: Option<NodeId>) -> SessionResult<String> {
        self.require("print", &OPEN)?;
        let node = node.unwrap_or(self.tree.root());
        self.tree.item(node)?;
        Ok(self.tree.render(node))
    }

    // ---------------------------------------------------------------
    // Device settings
    // ---------------------------------------------------------------

    /// Move the image location on every device of `kind`.
    ///
    /// The base must sit on an erase boundary; commits to a base inside a
    /// sector fail before anything is erased.
    pub fn change_base(&mut self, kind: BackendKind, base: u32) -> SessionResult<()> {
        if self.state == Closed {
            return Err(SessionError::InvalidState {
                op: "change_base",
                state: self.state,
            });
        }
        self.config.bases.set(kind, base);
        if self.pool_image.is_some_and(|image| image.kind == kind) {
            self.pool_image = None;
        }
        debug!(%kind, base, "base offset changed");
        Ok(())
    }

    /// Base offset for `kind` and the number of successful commits so far.
    pub fn get_count(&self, kind: BackendKind) -> (u32, u32) {
        (self.config.bases.get(kind), self.update_count)
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }

    pub fn reset_count(&mut self) {
        self.update_count = 0;
    }

    /// Change the pool size. Only possible before the pool is allocated.
    pub fn set_size(&mut self, pool_size: u32) -> SessionResult<()> {
        if !matches!(self.state, Uninitialized | Closed) {
            return Err(SessionError::PoolLocked);
        }
        let mut config = self.config.clone();
        config.pool_size = pool_size;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Encrypt subsequent saves under `key`, or stop encrypting with `None`.
    pub fn secure(&mut self, key: Option<KeyClass>) {
        self.config.secure = key;
        self.tree.set_capacity(self.tree_capacity());
        info!(key = ?key, "image protection changed");
    }

    // ---------------------------------------------------------------
    // Lite engine
    // ---------------------------------------------------------------

    /// Look up `path` directly in the image stored on `(kind, unit)`.
    pub fn lite_find(&mut self, kind: BackendKind, unit: u32, path: &str) -> SessionResult<LiteHit> {
        self.require("lite_find", &OPEN)?;
        let image = self.ensure_image(kind, unit, path)?;
        let payload = &self.pool[image.payload_range()];
        let entry = lite_find(payload, image.format, path)?
            .ok_or_else(|| SessionError::NotFound(path.to_string()))?;
        Ok(LiteHit {
            value: entry.value(payload),
            name: entry.name,
            kind: entry.kind,
            len: entry.len,
        })
    }

    /// Overwrite the value at `path` in place and re-commit the image.
    ///
    /// The value must have exactly the entry's current length.
    pub fn lite_update(
        &mut self,
        kind: BackendKind,
        unit: u32,
        path: &str,
        value: &Value,
    ) -> SessionResult<()> {
        self.require("lite_update", &OPEN)?;
        let image = self.ensure_image(kind, unit, path)?;
        let range = image.payload_range();
        let entry = lite_find(&self.pool[range.clone()], image.format, path)?
            .ok_or_else(|| SessionError::NotFound(path.to_string()))?;
        let compatible = match entry.kind {
            ItemKind::Group => false,
            ItemKind::Text(_) => matches!(value, Value::Text(_)),
            ItemKind::Fixed(_) => !matches!(value, Value::Text(_)),
        };
        if !compatible {
            return Err(CodecError::KindMismatch { kind: entry.kind }.into());
        }
        lite_update(&mut self.pool[range], &entry, &value.to_payload())?;
        self.pool_image = None;
        self.commit_pool(image)?;
        Ok(())
    }

    fn ensure_image(&mut self, kind: BackendKind, unit: u32, path: &str) -> SessionResult<PoolImage> {
        if let Some(image) = self.pool_image {
            if image.kind == kind && image.unit == unit {
                return Ok(image);
            }
        }
        match self.fetch(kind, unit)? {
            Some((image, _)) => Ok(image),
            None => Err(SessionError::NotFound(path.to_string())),
        }
    }

    // ---------------------------------------------------------------
    // Image plumbing
    // ---------------------------------------------------------------

    /// Make the pool hold the verified plaintext image of `(kind, unit)`.
    ///
    /// `Ok(None)` means the device holds no image. The flag reports a
    /// legacy image that was re-sealed on the way.
    fn fetch(&mut self, kind: BackendKind, unit: u32) -> SessionResult<Option<(PoolImage, bool)>> {
        self.pool_image = None;
        let header = match self.read_raw(kind, unit) {
            Ok(header) => header,
            Err(SessionError::Codec(CodecError::BadMagic { found })) => {
                debug!(%kind, unit, found, "no image magic");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if header.checksum != ChecksumWord::Unset {
            return self.open(kind, unit, &header).map(|image| Some((image, false)));
        }

        warn!(%kind, unit, "image has no checksum, re-sealing");
        let original = self.pool[..TABLE_HEADER_SIZE + header.stored_len() as usize].to_vec();
        let migrate = |session: &mut Self| -> SessionResult<PoolImage> {
            session.decrypt_in_pool(&header)?;
            session.commit_pool(PoolImage {
                kind,
                unit,
                format: header.format,
                total_len: header.total_len,
                key: header.envelope.map(|e| e.key_class),
            })?;
            let sealed = session.read_raw(kind, unit)?;
            session.open(kind, unit, &sealed)
        };
        match migrate(self) {
            Ok(image) => Ok(Some((image, true))),
            Err(err) => {
                self.pool_image = None;
                self.restore(kind, unit, &original);
                Err(SessionError::Migration(Box::new(err)))
            }
        }
    }

    /// Put a raw image back after a failed re-seal.
    fn restore(&mut self, kind: BackendKind, unit: u32, raw: &[u8]) {
        let base = self.config.bases.get(kind);
        let chunk = self.config.commit_chunk;
        let restored = self.devices.acquire(kind, unit).and_then(|binding| {
            let probe = binding.probe;
            let mut dev = lock(&binding.device)?;
            commit_image(&mut **dev, base, chunk, probe, raw)
        });
        match restored {
            Ok(()) => info!(%kind, unit, "legacy image restored"),
            Err(err) => warn!(%kind, unit, error = %err, "legacy image could not be restored"),
        }
    }

    fn read_raw(&mut self, kind: BackendKind, unit: u32) -> SessionResult<TableHeader> {
        let base = self.config.bases.get(kind);
        let chunk = self.config.commit_chunk;
        let binding = self.devices.acquire(kind, unit)?;
        let mut dev = lock(&binding.device)?;
        read_image(&mut **dev, base, chunk, &mut self.pool)
    }

    /// Verify the stored bytes against the header, then unwrap them.
    fn open(&mut self, kind: BackendKind, unit: u32, header: &TableHeader) -> SessionResult<PoolImage> {
        let stored = &self.pool[TABLE_HEADER_SIZE..TABLE_HEADER_SIZE + header.stored_len() as usize];
        if let Err(err) = header.checksum.verify(stored) {
            warn!(%kind, unit, error = %err, "image rejected");
            return Err(err.into());
        }
        if header.checksum.is_encrypted() != header.envelope.is_some() {
            return Err(CodecError::Malformed {
                offset: 8,
                reason: "checksum and envelope disagree on encryption".into(),
            }
            .into());
        }
        self.decrypt_in_pool(header)?;
        let image = PoolImage {
            kind,
            unit,
            format: header.format,
            total_len: header.total_len,
            key: header.envelope.map(|e| e.key_class),
        };
        self.pool_image = Some(image);
        Ok(image)
    }

    fn decrypt_in_pool(&mut self, header: &TableHeader) -> SessionResult<()> {
        let Some(Envelope { key_class, len }) = header.envelope else {
            return Ok(());
        };
        let start = TABLE_HEADER_SIZE;
        let plain = self
            .cipher
            .unwrap(key_class, ASSET_ID, &self.pool[start..start + len as usize])?;
        if plain.len() != header.total_len as usize {
            return Err(CodecError::Malformed {
                offset: start,
                reason: format!(
                    "unwrapped {} bytes, header says {}",
                    plain.len(),
                    header.total_len
                ),
            }
            .into());
        }
        self.pool[start..start + plain.len()].copy_from_slice(&plain);
        Ok(())
    }

    /// Seal the plaintext payload in the pool and commit it to the target.
    fn commit_pool(&mut self, target: PoolImage) -> SessionResult<()> {
        let start = TABLE_HEADER_SIZE;
        let payload = &self.pool[target.payload_range()];
        let stored = match target.key {
            Some(key) => self.cipher.wrap(key, ASSET_ID, IMAGE_NONCE, payload)?,
            None => payload.to_vec(),
        };
        let limit = self.pool.len() - start;
        if stored.len() > limit {
            return Err(CodecError::TooLarge {
                len: stored.len() as u32,
                limit: limit as u32,
            }
            .into());
        }

        let mut header = TableHeader::new(target.total_len, target.format);
        header.checksum = ChecksumWord::compute(self.config.checksum, target.key.is_some(), &stored);
        header.envelope = target.key.map(|key_class| Envelope {
            key_class,
            len: stored.len() as u32,
        });
        let encoded = header.encode();
        let mut image = Vec::with_capacity(start + stored.len());
        image.extend_from_slice(&encoded);
        image.extend_from_slice(&stored);

        let base = self.config.bases.get(target.kind);
        let chunk = self.config.commit_chunk;
        {
            let binding = self.devices.acquire(target.kind, target.unit)?;
            let probe = binding.probe;
            let mut dev = lock(&binding.device)?;
            commit_image(&mut **dev, base, chunk, probe, &image)?;
        }
        self.pool[..start].copy_from_slice(&encoded);
        self.update_count = self.update_count.wrapping_add(1);
        self.pool_image = Some(target);
        info!(
            kind = %target.kind,
            unit = target.unit,
            base,
            total = target.total_len,
            stored = stored.len(),
            encrypted = target.key.is_some(),
            "image committed"
        );
        Ok(())
    }
}

/// Text values go into text items, everything else into fixed items.
fn check_kind(tree: &Tree, node: NodeId, value: &Value) -> SessionResult<()> {
    let item = tree.item(node)?;
    let ok = match item.kind() {
        ItemKind::Group => false,
        ItemKind::Text(_) => matches!(value, Value::Text(_)),
        ItemKind::Fixed(_) => !matches!(value, Value::Text(_)),
    };
    if ok {
        Ok(())
    } else {
        Err(TreeError::KindMismatch {
            name: item.name().to_string(),
            kind: item.kind(),
        }
        .into())
    }
}
