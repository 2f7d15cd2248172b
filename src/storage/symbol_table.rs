use std::path::Path;

use crate::error::{GraphError, Result};
use crate::storage::handle_map::HandleMap;
use crate::storage::string_pool::{StringHandle, StringPool};
use crate::types::{OpenCode, OpenMode, SymbolId};

/// Bidirectional map between a small integer id and an interned symbol.
///
/// Backed by a null-terminated [`StringPool`]; ids are assigned densely in
/// insertion order and recovered on load by scanning the pool. The 8-bit
/// id space caps a table at 256 distinct symbols.
pub struct SymbolTable {
    pool: StringPool,
    handles: Vec<StringHandle>,
    ids: HandleMap<SymbolId>,
}

impl SymbolTable {
    pub fn open(
        path: &Path,
        mode: OpenMode,
        defaults: &[&str],
        chunk_bytes: usize,
    ) -> Result<(Self, OpenCode)> {
        let (pool, code) = StringPool::open_null_terminated(path, mode, chunk_bytes)?;
        let mut table = Self {
            pool,
            handles: Vec::new(),
            ids: HandleMap::new(),
        };
        match code {
            OpenCode::Created => {
                for symbol in defaults {
                    table.add(symbol)?;
                }
            }
            OpenCode::Loaded => {
                for handle in table.pool.scan_terminated() {
                    if table.handles.len() > SymbolId::MAX as usize {
                        return Err(GraphError::Corruption(format!(
                            "{}: more symbols than the id space allows",
                            path.display()
                        )));
                    }
                    let id = table.handles.len() as SymbolId;
                    table.handles.push(handle);
                    table.ids.insert(&table.pool, handle, id);
                }
            }
        }
        Ok((table, code))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Bytes the symbol pool occupies, terminators included.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn get(&self, id: SymbolId) -> Result<&str> {
        let handle = self
            .handles
            .get(id as usize)
            .copied()
            .ok_or_else(|| GraphError::Corruption(format!("symbol id {id} out of range")))?;
        self.pool.get(handle)
    }

    pub fn id(&self, symbol: &str) -> Option<SymbolId> {
        self.ids.get(&self.pool, symbol)
    }

    /// Idempotent insert: returns the existing id when the symbol is
    /// already present.
    pub fn add(&mut self, symbol: &str) -> Result<SymbolId> {
        if let Some(id) = self.id(symbol) {
            return Ok(id);
        }
        if self.handles.len() > SymbolId::MAX as usize {
            return Err(GraphError::Usage(format!(
                "symbol table full: cannot intern {symbol:?} beyond 256 entries"
            )));
        }
        let id = self.handles.len() as SymbolId;
        let handle = self.pool.add(symbol)?;
        self.handles.push(handle);
        self.ids.insert(&self.pool, handle, id);
        Ok(id)
    }

    /// Conservative recovery: keeps the first `count` symbols and drops
    /// any bytes past them (entries the control record never claimed).
    pub fn truncate(&mut self, count: usize) -> Result<()> {
        if count > self.handles.len() {
            return Err(GraphError::Corruption(format!(
                "symbol table holds {} entries but {count} are claimed",
                self.handles.len()
            )));
        }
        if count == self.handles.len() {
            return Ok(());
        }
        self.handles.truncate(count);
        let end = self
            .handles
            .last()
            .map(|h| h.offset as usize + h.length as usize + 1)
            .unwrap_or(0);
        self.pool.truncate(end);
        self.ids.clear();
        for (id, &handle) in self.handles.iter().enumerate() {
            self.ids.insert(&self.pool, handle, id as SymbolId);
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.pool.sync()
    }
}
