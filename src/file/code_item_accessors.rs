use super::{ByteCursor, CatchHandlerData, CodeItem, DexItem, EncodedCatchHandler, TryItem};
use crate::Result;

// ----------------------------------------------------------------------------
// CodeItemAccessor
// ----------------------------------------------------------------------------
/// View of a `code_item` inside the file buffer. Construction validates the
/// header and the instruction array, tries and handlers are decoded on
/// demand.
#[derive(Debug, Clone)]
pub struct CodeItemAccessor<'a> {
    data: &'a [u8],
    code_off: u32,

    registers_size: u16,
    ins_size: u16,
    outs_size: u16,
    tries_size: u16,
    debug_info_off: u32,
    insns: &'a [u8],
}

impl<'a> CodeItemAccessor<'a> {
    pub fn new(data: &'a [u8], code_off: u32) -> Result<CodeItemAccessor<'a>> {
        let mut cursor = ByteCursor::at(data, code_off as usize)?;
        let registers_size = cursor.read_u16()?;
        let ins_size = cursor.read_u16()?;
        let outs_size = cursor.read_u16()?;
        let tries_size = cursor.read_u16()?;
        let debug_info_off = cursor.read_u32()?;
        let insns_size = cursor.read_u32()?;
        let insns = cursor.read_bytes((insns_size as usize).saturating_mul(2))?;
        Ok(CodeItemAccessor {
            data,
            code_off,
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns,
        })
    }

    #[inline]
    pub fn insns_size_in_code_units(&self) -> u32 {
        (self.insns.len() / 2) as u32
    }

    #[inline]
    pub fn insns_size_in_bytes(&self) -> u32 {
        self.insns.len() as u32
    }

    /// Raw instruction words, not decoded any further.
    pub fn insns(&self) -> Vec<u16> {
        self.insns
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect()
    }

    pub fn code_item_off(&self) -> u32 {
        self.code_off
    }

    pub fn insns_off(&self) -> usize {
        self.code_off as usize + CodeItem::HEADER_SIZE
    }

    /// Offset of the try items relative to the instructions.
    #[inline]
    pub fn get_tries_off(&self) -> Option<usize> {
        if self.tries_size == 0 {
            return None;
        }

        let offset = self.insns_size_in_bytes() as usize;
        // must be 4-byte aligned
        let padding = if self.insns_size_in_code_units() % 2 == 1 {
            2
        } else {
            0
        };
        Some(offset + padding)
    }

    #[inline]
    pub fn get_tries_abs_off(&self) -> Option<usize> {
        self.get_tries_off()
            .map(|tries_off| tries_off + self.insns_off())
    }

    #[inline]
    pub fn get_catch_handler_data_abs_off(&self) -> Option<usize> {
        self.get_tries_abs_off()
            .map(|tries_off| tries_off + self.tries_size as usize * TryItem::SIZE)
    }

    pub fn registers_size(&self) -> u16 {
        self.registers_size
    }

    pub fn ins_size(&self) -> u16 {
        self.ins_size
    }

    pub fn outs_size(&self) -> u16 {
        self.outs_size
    }

    pub fn tries_size(&self) -> u16 {
        self.tries_size
    }

    pub fn debug_info_off(&self) -> Option<u32> {
        match self.debug_info_off {
            0 => None,
            off => Some(off),
        }
    }

    pub fn tries(&self) -> Result<Vec<TryItem>> {
        let Some(tries_off) = self.get_tries_abs_off() else {
            return Ok(Vec::new());
        };
        let mut cursor = ByteCursor::at(self.data, tries_off)?;
        (0..self.tries_size)
            .map(|_| TryItem::read(&mut cursor))
            .collect()
    }

    /// Decodes the encoded catch handler list that follows the try items.
    pub fn catch_handlers(&self) -> Result<Vec<EncodedCatchHandler>> {
        let Some(list_off) = self.get_catch_handler_data_abs_off() else {
            return Ok(Vec::new());
        };
        let mut cursor = ByteCursor::at(self.data, list_off)?;
        let size = cursor.read_uleb128()? as usize;

        let mut handlers = Vec::with_capacity(size.min(cursor.remaining()));
        for _ in 0..size {
            let offset = cursor.position() - list_off;
            let mut iter = EncodedCatchHandlerIterator::new(self.data, cursor.position())?;
            let entries = iter.by_ref().collect::<Result<Vec<_>>>()?;
            cursor.seek(iter.offset())?;
            handlers.push(EncodedCatchHandler {
                offset: offset as u32,
                handlers: entries,
            });
        }
        Ok(handlers)
    }

    /// Copies everything into an owned [`CodeItem`].
    pub fn to_code_item(&self) -> Result<CodeItem> {
        Ok(CodeItem {
            registers_size: self.registers_size,
            ins_size: self.ins_size,
            outs_size: self.outs_size,
            tries_size: self.tries_size,
            debug_info_off: self.debug_info_off(),
            insns_size: self.insns_size_in_code_units(),
            insns: self.insns(),
            tries: self.tries()?,
            handlers: self.catch_handlers()?,
        })
    }
}

// ----------------------------------------------------------------------------
// EncodedCatchHandler Iterator
// ----------------------------------------------------------------------------

/// Iterates the entries of one `encoded_catch_handler`. The catch-all
/// handler, if present, comes last.
pub struct EncodedCatchHandlerIterator<'a> {
    cursor: ByteCursor<'a>,
    has_catch_all: bool,
    remaining: u32,
}

impl<'a> EncodedCatchHandlerIterator<'a> {
    pub fn new(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut cursor = ByteCursor::at(data, offset)?;
        // A non-positive size is the negated number of typed handlers,
        // followed by a catch-all address.
        let size = cursor.read_sleb128()?;
        Ok(Self {
            cursor,
            has_catch_all: size <= 0,
            remaining: size.unsigned_abs(),
        })
    }

    pub fn offset(&self) -> usize {
        self.cursor.position()
    }

    fn read_handler(&mut self) -> Result<CatchHandlerData> {
        if self.remaining > 0 {
            let type_idx = self.cursor.read_uleb128()?;
            let address = self.cursor.read_uleb128()?;
            self.remaining -= 1;
            return Ok(CatchHandlerData {
                type_idx: Some(type_idx),
                address,
            });
        }

        let address = self.cursor.read_uleb128()?;
        self.has_catch_all = false;
        Ok(CatchHandlerData {
            type_idx: None,
            address,
        })
    }
}

impl<'a> Iterator for EncodedCatchHandlerIterator<'a> {
    type Item = Result<CatchHandlerData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 && !self.has_catch_all {
            return None;
        }

        let handler = self.read_handler();
        if handler.is_err() {
            self.remaining = 0;
            self.has_catch_all = false;
        }
        Some(handler)
    }
}
