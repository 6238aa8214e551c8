/// Key-value cache for transformer attention.
///
/// One cache holds one sequence. It is owned by the execution context, not
/// the model, so a single loaded model can serve several caches.
///
/// Per layer, keys and values are flat arrays of shape
/// [capacity, n_kv_heads * head_dim], preallocated up front so a generation
/// never reallocates mid-pass.
pub struct KvCache {
    k: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
    n_kv_heads: usize,
    head_dim: usize,
    capacity: usize,
    len: usize,
}

impl KvCache {
    /// Allocate a zeroed cache for up to `capacity` positions.
    pub fn new(n_layers: usize, n_kv_heads: usize, head_dim: usize, capacity: usize) -> KvCache {
        let layer_size = n_kv_heads * head_dim * capacity;
        KvCache {
            k: (0..n_layers).map(|_| vec![0.0; layer_size]).collect(),
            v: (0..n_layers).map(|_| vec![0.0; layer_size]).collect(),
            n_kv_heads,
            head_dim,
            capacity,
            len: 0,
        }
    }

    /// Write one token's key and value vectors (each of length
    /// n_kv_heads * head_dim) at position `pos` of the given layer.
    ///
    /// Callers check capacity before a pass; writing past it is a bug, so
    /// the slice indexing is allowed to panic.
    pub fn update(&mut self, layer: usize, k_data: &[f32], v_data: &[f32], pos: usize) {
        let kv_dim = self.n_kv_heads * self.head_dim;
        let offset = pos * kv_dim;
        self.k[layer][offset..offset + kv_dim].copy_from_slice(k_data);
        self.v[layer][offset..offset + kv_dim].copy_from_slice(v_data);
        self.len = self.len.max(pos + 1);
    }

    /// Keys for positions 0..seq_len of a layer.
    pub fn keys(&self, layer: usize, seq_len: usize) -> &[f32] {
        &self.k[layer][..seq_len * self.n_kv_heads * self.head_dim]
    }

    /// Values for positions 0..seq_len of a layer.
    pub fn values(&self, layer: usize, seq_len: usize) -> &[f32] {
        &self.v[layer][..seq_len * self.n_kv_heads * self.head_dim]
    }

    /// Clear the cache for a fresh sequence.
    pub fn reset(&mut self) {
        for layer in self.k.iter_mut().chain(self.v.iter_mut()) {
            layer.fill(0.0);
        }
        self.len = 0;
    }

    /// Number of positions currently occupied.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no positions are occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of positions this cache can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
