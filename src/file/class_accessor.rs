use std::{collections::HashMap, sync::Arc};

use log::trace;

use super::{
    ByteCursor, ClassData, CodeItem, CodeItemAccessor, EncodedField, EncodedMethod, FieldIndex,
    MethodIndex, ACC_STATIC,
};
use crate::{dex_err, Result};

/// A member entry of a `class_data_item`. Entries store their index as a
/// delta to the previous entry of the same list.
pub trait ClassItemBase: Copy + Clone {
    const NAME: &'static str;

    fn read(&mut self, cursor: &mut ByteCursor<'_>) -> Result<()>;

    fn init() -> Self;

    /// Switches to the next list, which restarts the index accumulator.
    fn next_section(&mut self);
}

#[inline]
fn add_delta(index: u32, delta: u32, item_ty: &'static str) -> Result<u32> {
    match index.checked_add(delta) {
        Some(next) => Ok(next),
        None => dex_err!(BadEncodedIndex {
            index,
            next_index: delta,
            item_ty
        }),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Method {
    pub index: MethodIndex,
    pub access_flags: u32,
    pub code_offset: u32,
    pub is_direct: bool,
}

impl Method {
    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    #[inline]
    pub fn code_off(&self) -> Option<u32> {
        match self.code_offset {
            0 => None,
            off => Some(off),
        }
    }
}

impl ClassItemBase for Method {
    const NAME: &'static str = "EncodedMethod";

    fn read(&mut self, cursor: &mut ByteCursor<'_>) -> Result<()> {
        let delta = cursor.read_uleb128()?;
        self.index = add_delta(self.index, delta, Self::NAME)?;
        self.access_flags = cursor.read_uleb128()?;
        self.code_offset = cursor.read_uleb128()?;
        Ok(())
    }

    fn init() -> Self {
        Self {
            index: 0,
            access_flags: 0,
            code_offset: 0,
            is_direct: true,
        }
    }

    fn next_section(&mut self) {
        self.index = 0;
        self.is_direct = false;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Field {
    pub index: FieldIndex,
    pub access_flags: u32,
    pub is_static: bool,
}

impl Field {
    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl ClassItemBase for Field {
    const NAME: &'static str = "EncodedField";

    fn read(&mut self, cursor: &mut ByteCursor<'_>) -> Result<()> {
        let delta = cursor.read_uleb128()?;
        self.index = add_delta(self.index, delta, Self::NAME)?;
        self.access_flags = cursor.read_uleb128()?;
        Ok(())
    }

    fn init() -> Self {
        Self {
            index: 0,
            access_flags: 0,
            is_static: true,
        }
    }

    fn next_section(&mut self) {
        self.index = 0;
        self.is_static = false;
    }
}

/// Walks the encoded member lists of one `class_data_item` directly over
/// the file buffer.
#[derive(Debug, Clone)]
pub struct ClassAccessor<'a> {
    data: &'a [u8],
    class_data_off: usize,

    pub num_static_fields: u32,
    pub num_instance_fields: u32,
    pub num_direct_methods: u32,
    pub num_virtual_methods: u32,

    // position right after the four counts
    static_fields_off: usize,
}

impl<'a> ClassAccessor<'a> {
    /// Reads the member counts of the class data item at `class_data_off`.
    pub fn new(data: &'a [u8], class_data_off: u32) -> Result<Self> {
        let mut cursor = ByteCursor::at(data, class_data_off as usize)?;
        let num_static_fields = cursor.read_uleb128()?;
        let num_instance_fields = cursor.read_uleb128()?;
        let num_direct_methods = cursor.read_uleb128()?;
        let num_virtual_methods = cursor.read_uleb128()?;
        Ok(Self {
            data,
            class_data_off: class_data_off as usize,
            num_static_fields,
            num_instance_fields,
            num_direct_methods,
            num_virtual_methods,
            static_fields_off: cursor.position(),
        })
    }

    #[inline(always)]
    pub fn class_data_off(&self) -> usize {
        self.class_data_off
    }

    #[inline(always)]
    pub fn num_fields(&self) -> usize {
        self.num_instance_fields as usize + self.num_static_fields as usize
    }

    #[inline(always)]
    pub fn num_methods(&self) -> usize {
        self.num_direct_methods as usize + self.num_virtual_methods as usize
    }

    #[inline(always)]
    pub fn visit_fields<SF, IF>(&self, static_field_visitor: SF, instance_field_visitor: IF) -> Result<()>
    where
        SF: FnMut(&Field) -> Result<()>,
        IF: FnMut(&Field) -> Result<()>,
    {
        self.visit_fields_and_methods(
            static_field_visitor,
            instance_field_visitor,
            |_| Ok(()),
            |_| Ok(()),
        )
    }

    #[inline(always)]
    pub fn visit_methods<DM, VM>(&self, direct_method_visitor: DM, virtual_method_visitor: VM) -> Result<()>
    where
        DM: FnMut(&Method) -> Result<()>,
        VM: FnMut(&Method) -> Result<()>,
    {
        self.visit_fields_and_methods(
            |_| Ok(()),
            |_| Ok(()),
            direct_method_visitor,
            virtual_method_visitor,
        )
    }

    pub fn visit_fields_and_methods<SF, IF, DM, VM>(
        &self,
        static_field_visitor: SF,
        instance_field_visitor: IF,
        direct_method_visitor: DM,
        virtual_method_visitor: VM,
    ) -> Result<()>
    where
        SF: FnMut(&Field) -> Result<()>,
        IF: FnMut(&Field) -> Result<()>,
        DM: FnMut(&Method) -> Result<()>,
        VM: FnMut(&Method) -> Result<()>,
    {
        let mut cursor = ByteCursor::at(self.data, self.static_fields_off)?;

        let mut field = Field::init();
        Self::visit_members(
            self.num_static_fields,
            &mut cursor,
            static_field_visitor,
            &mut field,
        )?;
        // switch to instance fields
        field.next_section();
        Self::visit_members(
            self.num_instance_fields,
            &mut cursor,
            instance_field_visitor,
            &mut field,
        )?;

        let mut method = Method::init();
        Self::visit_members(
            self.num_direct_methods,
            &mut cursor,
            direct_method_visitor,
            &mut method,
        )?;
        method.next_section();
        Self::visit_members(
            self.num_virtual_methods,
            &mut cursor,
            virtual_method_visitor,
            &mut method,
        )
    }

    #[inline(always)]
    pub fn get_fields(&self) -> DataIterator<'a, Field> {
        DataIterator::new(
            self.data,
            self.static_fields_off,
            self.num_static_fields as usize,
            self.num_fields(),
        )
    }

    #[inline(always)]
    pub fn get_static_fields(&self) -> DataIterator<'a, Field> {
        DataIterator::new(
            self.data,
            self.static_fields_off,
            self.num_static_fields as usize,
            self.num_static_fields as usize,
        )
    }

    #[inline(always)]
    pub fn get_instance_fields(&self) -> impl Iterator<Item = Result<Field>> + 'a {
        self.get_fields().skip(self.num_static_fields as usize)
    }

    /// Iterates direct and then virtual methods. The field lists have to be
    /// skipped first, so this may already fail on malformed field entries.
    pub fn get_methods(&self) -> Result<DataIterator<'a, Method>> {
        let mut cursor = ByteCursor::at(self.data, self.static_fields_off)?;
        let mut field = Field::init();
        Self::visit_members(
            self.num_static_fields,
            &mut cursor,
            |_| Ok(()),
            &mut field,
        )?;
        field.next_section();
        Self::visit_members(
            self.num_instance_fields,
            &mut cursor,
            |_| Ok(()),
            &mut field,
        )?;
        Ok(DataIterator::new(
            self.data,
            cursor.position(),
            self.num_direct_methods as usize,
            self.num_methods(),
        ))
    }

    #[inline(always)]
    pub fn get_direct_methods(&self) -> Result<impl Iterator<Item = Result<Method>> + 'a> {
        Ok(self.get_methods()?.take(self.num_direct_methods as usize))
    }

    #[inline(always)]
    pub fn get_virtual_methods(&self) -> Result<impl Iterator<Item = Result<Method>> + 'a> {
        Ok(self.get_methods()?.skip(self.num_direct_methods as usize))
    }

    /// Decodes the whole class data item, including the code items of all
    /// methods that have one. Methods with the same code offset share one
    /// decoded code item.
    pub fn read_class_data(&self) -> Result<ClassData> {
        let data = self.data;
        let mut code_items: HashMap<u32, Arc<CodeItem>> = HashMap::new();
        self.read_class_data_with(|off| {
            if let Some(code) = code_items.get(&off) {
                return Ok(Arc::clone(code));
            }
            let code = Arc::new(CodeItemAccessor::new(data, off)?.to_code_item()?);
            code_items.insert(off, Arc::clone(&code));
            Ok(code)
        })
    }

    /// Decodes the whole class data item and resolves code offsets with
    /// `code_item`.
    pub fn read_class_data_with<F>(&self, mut code_item: F) -> Result<ClassData>
    where
        F: FnMut(u32) -> Result<Arc<CodeItem>>,
    {
        trace!(
            "class data at {:#x}: {} static, {} instance fields, {} direct, {} virtual methods",
            self.class_data_off,
            self.num_static_fields,
            self.num_instance_fields,
            self.num_direct_methods,
            self.num_virtual_methods
        );
        // every entry takes at least two bytes
        let bound = (self.data.len() - self.static_fields_off) / 2;
        let capacity = |count: u32| (count as usize).min(bound);
        let mut static_fields = Vec::with_capacity(capacity(self.num_static_fields));
        let mut instance_fields = Vec::with_capacity(capacity(self.num_instance_fields));
        let mut direct = Vec::with_capacity(capacity(self.num_direct_methods));
        let mut virtual_ = Vec::with_capacity(capacity(self.num_virtual_methods));

        let to_field = |field: &Field| EncodedField {
            field_idx: field.index,
            access_flags: field.access_flags,
        };
        self.visit_fields_and_methods(
            |field| {
                static_fields.push(to_field(field));
                Ok(())
            },
            |field| {
                instance_fields.push(to_field(field));
                Ok(())
            },
            |method| {
                direct.push(*method);
                Ok(())
            },
            |method| {
                virtual_.push(*method);
                Ok(())
            },
        )?;

        let mut to_method = |method: &Method| -> Result<EncodedMethod> {
            Ok(EncodedMethod {
                method_idx: method.index,
                access_flags: method.access_flags,
                code_off: method.code_off(),
                code: method.code_off().map(&mut code_item).transpose()?,
            })
        };
        let direct_methods = direct.iter().map(&mut to_method).collect::<Result<_>>()?;
        let virtual_methods = virtual_.iter().map(&mut to_method).collect::<Result<_>>()?;

        Ok(ClassData {
            static_fields,
            instance_fields,
            direct_methods,
            virtual_methods,
        })
    }

    #[inline(always)]
    fn visit_members<T, F>(
        count: u32,
        cursor: &mut ByteCursor<'_>,
        mut visitor: F,
        item: &mut T,
    ) -> Result<()>
    where
        T: ClassItemBase,
        F: FnMut(&T) -> Result<()>,
    {
        for _ in 0..count {
            item.read(cursor)?;
            visitor(item)?;
        }
        Ok(())
    }
}

/// Iterator over encoded members, switching to the second list after
/// `partition_pos` items. Iteration ends after the first error.
pub struct DataIterator<'a, T: ClassItemBase> {
    data: &'a [u8],
    value: T,

    pos: usize,           // mutable
    off: usize,           // mutable
    partition_pos: usize, // const
    end_pos: usize,       // const
}

impl<'a, T: ClassItemBase> DataIterator<'a, T> {
    pub fn new(data: &'a [u8], start_pos: usize, partition_pos: usize, end_pos: usize) -> Self {
        Self {
            data,
            value: T::init(),
            pos: 0,
            off: start_pos,
            partition_pos,
            end_pos,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.pos < self.end_pos
    }

    pub fn offset(&self) -> usize {
        self.off
    }

    fn read_next(&mut self) -> Result<T> {
        let mut cursor = ByteCursor::at(self.data, self.off)?;
        self.value.read(&mut cursor)?;
        self.off = cursor.position();
        Ok(self.value)
    }
}

impl<'a, T: ClassItemBase> Iterator for DataIterator<'a, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.is_valid() {
            return None;
        }
        if self.pos == self.partition_pos {
            self.value.next_section();
        }
        self.pos += 1;
        let item = self.read_next();
        if item.is_err() {
            self.pos = self.end_pos;
        }
        Some(item)
    }
}
