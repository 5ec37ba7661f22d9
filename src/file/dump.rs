use std::io::Write;

use crate::{desc_names::pretty_desc, Result};

use super::{
    pretty_access_flags, verifier::hexlify, AccessTarget, ClassDef, DexImage, EncodedField,
    EncodedMethod, FieldIndex, MethodIndex, StringIndex, TypeIndex,
};

pub mod prettify {

    #[derive(Copy, Clone, PartialEq, Eq)]
    pub enum Field {
        WithType,
        NoType,
    }

    #[derive(Copy, Clone, PartialEq, Eq)]
    pub enum Method {
        WithSig,
        NoSig,
    }
}

/// Options of [`DexImage::write_report`].
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// include header offsets, class details, fields and code metadata
    pub verbose: bool,
    /// printed as `[] Dex file: ...` when set
    pub location: Option<String>,
}

impl DexImage {
    pub fn pretty_type_at(&self, type_idx: TypeIndex) -> String {
        match self.pretty_type_opt_at(type_idx) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-type-idx-{type_idx}>>"),
        }
    }

    pub fn pretty_type_opt_at(&self, type_idx: TypeIndex) -> Result<String> {
        Ok(pretty_desc(self.type_name(type_idx)?))
    }

    pub fn pretty_utf16_at(&self, idx: StringIndex) -> String {
        match self.string_at(idx) {
            Ok(str_data) => str_data.to_string(),
            Err(_) => format!("<<invalid-string-idx-{idx}>>"),
        }
    }

    pub fn pretty_field_at(&self, field_idx: FieldIndex, opts: prettify::Field) -> String {
        match self.pretty_field_opt_at(field_idx, opts) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-field-idx-{field_idx}>>"),
        }
    }

    pub fn pretty_field_opt_at(&self, field_idx: FieldIndex, opts: prettify::Field) -> Result<String> {
        let field_id = self.get_field_id(field_idx)?;
        let mut result = String::new();
        if opts == prettify::Field::WithType {
            result.push_str(&self.pretty_type_opt_at(field_id.type_idx)?);
            result.push(' ');
        }

        result.push_str(&self.pretty_type_opt_at(field_id.class_idx)?);
        result.push('.');
        result.push_str(self.string_at(field_id.name_idx)?);
        Ok(result)
    }

    pub fn pretty_method_at(&self, method_idx: MethodIndex, opts: prettify::Method) -> String {
        match self.pretty_method_opt_at(method_idx, opts) {
            Ok(s) => s,
            Err(_) => format!("<<invalid-method-idx-{method_idx}>>"),
        }
    }

    /// Java style method name, e.g. `void com.example.Foo.bar(int, java.lang.String)`.
    pub fn pretty_method_opt_at(&self, method_idx: MethodIndex, opts: prettify::Method) -> Result<String> {
        let signature = self.method_signature(method_idx)?;
        let mut result = String::new();
        if opts == prettify::Method::WithSig {
            result.push_str(&pretty_desc(signature.return_type));
            result.push(' ');
        }

        result.push_str(&pretty_desc(signature.class));
        result.push('.');
        result.push_str(signature.name);

        if opts == prettify::Method::WithSig {
            let params = signature
                .parameters
                .iter()
                .map(|param| pretty_desc(param))
                .collect::<Vec<_>>();
            result.push('(');
            result.push_str(&params.join(", "));
            result.push(')');
        }
        Ok(result)
    }

    /// Writes a text report of the image: header information, one
    /// `MethodVal <signature>` line per method id and a summary per class.
    pub fn write_report<W: Write>(&self, out: &mut W, opts: &ReportOptions) -> Result<()> {
        if let Some(location) = &opts.location {
            writeln!(out, "[] Dex file: {location}\n")?;
        }
        self.write_header_info(out, opts.verbose)?;

        writeln!(out, "\n[] Number of classes in the archive: {}", self.class_count())?;
        for method_idx in 0..self.num_method_ids() {
            writeln!(out, "MethodVal {}", self.method_signature(method_idx)?)?;
        }

        for (idx, class_def) in self.get_class_defs().iter().enumerate() {
            self.write_class(out, idx as u32, class_def, opts.verbose)?;
        }
        Ok(())
    }

    /// Renders [`DexImage::write_report`] into a string.
    pub fn report_string(&self, opts: &ReportOptions) -> Result<String> {
        let mut out = Vec::new();
        self.write_report(&mut out, opts)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn write_header_info<W: Write>(&self, out: &mut W, verbose: bool) -> Result<()> {
        let header = self.header();
        let magic = header
            .get_magic()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>();
        writeln!(out, "[] DEX magic: {}", magic.join(" "))?;
        writeln!(out, "[] DEX version: {}", header.get_version_str())?;
        writeln!(out, "[] Adler32 checksum: {:#x}", header.checksum)?;
        writeln!(out, "[] SHA1 signature: {}", hexlify(header.get_signature()))?;
        if !verbose {
            return Ok(());
        }

        writeln!(out, "[] File size: {} bytes", header.file_size)?;
        writeln!(
            out,
            "[] DEX Header size: {} bytes ({:#x})",
            header.header_size, header.header_size
        )?;
        writeln!(out, "[] Endian Tag: {:#x}", header.endian_tag)?;
        writeln!(out, "[] Link size: {}", header.link_size)?;
        writeln!(out, "[] Link offset: {:#x}", header.link_off)?;
        writeln!(out, "[] Map list offset: {:#x}", header.map_off)?;
        let tables = [
            ("strings in string ID list", "String ID list", header.string_ids_size, header.string_ids_off),
            ("types in the type ID list", "Type ID list", header.type_ids_size, header.type_ids_off),
            ("items in the method prototype ID list", "Method prototype ID list", header.proto_ids_size, header.proto_ids_off),
            ("items in the field ID list", "Field ID list", header.field_ids_size, header.field_ids_off),
            ("items in the method ID list", "Method ID list", header.method_ids_size, header.method_ids_off),
            ("items in the class definitions list", "Class definitions list", header.class_defs_size, header.class_defs_off),
        ];
        for (count_label, off_label, count, off) in tables {
            writeln!(out, "[] Number of {count_label}: {count}")?;
            writeln!(out, "[] {off_label} offset: {off:#x}")?;
        }
        writeln!(out, "[] Data section size: {} bytes", header.data_size)?;
        writeln!(out, "[] Data section offset: {:#x}", header.data_off)?;
        if let Some(container) = &header.container {
            writeln!(out, "[] Container size: {} bytes", container.container_size)?;
            writeln!(out, "[] Header offset in container: {:#x}", container.header_off)?;
        }
        Ok(())
    }

    fn write_class<W: Write>(&self, out: &mut W, idx: u32, class_def: &ClassDef, verbose: bool) -> Result<()> {
        match self.get_source_file(class_def)? {
            Some(source_file) => writeln!(out, "[] Class {} ({source_file})", idx + 1)?,
            None => writeln!(out, "[] Class {} (No index)", idx + 1)?,
        }

        if verbose {
            writeln!(
                out,
                "\tclass_idx='{:#x}': {}",
                class_def.class_idx,
                self.get_class_desc(class_def)?
            )?;
            writeln!(
                out,
                "\taccess_flags='{:#x}': {}",
                class_def.access_flags,
                pretty_access_flags(class_def.access_flags, AccessTarget::Class)
            )?;
            match class_def.superclass_idx {
                Some(superclass_idx) => writeln!(
                    out,
                    "\tsuperclass_idx='{superclass_idx:#x}': {}",
                    self.type_name(superclass_idx)?
                )?,
                None => writeln!(out, "\tsuperclass_idx=none")?,
            }
            writeln!(out, "\tinterfaces_off='{:#x}'", class_def.interfaces_off.unwrap_or(0))?;
            for interface in self.get_interfaces(class_def)? {
                writeln!(out, "\t\t{interface}")?;
            }
            writeln!(out, "\tannotations_off={:#x}", class_def.annotations_off.unwrap_or(0))?;
            let class_data_off = class_def.class_data_off.unwrap_or(0);
            writeln!(out, "\tclass_data_off={class_data_off:#x} ({class_data_off})")?;
            let static_values_off = class_def.static_values_off.unwrap_or(0);
            writeln!(out, "\tstatic_values_off={static_values_off:#x} ({static_values_off})")?;
        }

        let Some(class_data) = self.class_data_at(idx)? else {
            writeln!(out, "0 direct methods, 0 virtual methods")?;
            return Ok(());
        };

        if verbose {
            writeln!(out, "\t{} static fields", class_data.static_fields.len())?;
            self.write_fields(out, &class_data.static_fields)?;
            writeln!(out, "\t{} instance fields", class_data.instance_fields.len())?;
            self.write_fields(out, &class_data.instance_fields)?;
        }
        writeln!(
            out,
            "{} direct methods, {} virtual methods",
            class_data.direct_methods.len(),
            class_data.virtual_methods.len()
        )?;
        self.write_methods(out, "direct", &class_data.direct_methods, verbose)?;
        self.write_methods(out, "virtual", &class_data.virtual_methods, verbose)
    }

    fn write_fields<W: Write>(&self, out: &mut W, fields: &[EncodedField]) -> Result<()> {
        for (i, field) in fields.iter().enumerate() {
            writeln!(
                out,
                "\t\t[{i}] {} '{:#x}': {}",
                self.pretty_field_opt_at(field.field_idx, prettify::Field::WithType)?,
                field.access_flags,
                pretty_access_flags(field.access_flags, AccessTarget::Field)
            )?;
        }
        Ok(())
    }

    fn write_methods<W: Write>(
        &self,
        out: &mut W,
        kind: &str,
        methods: &[EncodedMethod],
        verbose: bool,
    ) -> Result<()> {
        for (i, method) in methods.iter().enumerate() {
            let method_id = self.get_method_id(method.method_idx)?;
            writeln!(
                out,
                "\t{kind} method {} = {}",
                i + 1,
                self.string_at(method_id.name_idx)?
            )?;
            if !verbose {
                continue;
            }

            writeln!(out, "\t\tsignature={}", self.method_signature(method.method_idx)?)?;
            writeln!(out, "\t\tmethod_code_off={:#x}", method.code_off.unwrap_or(0))?;
            writeln!(
                out,
                "\t\tmethod_access_flags='{:#x}': {}",
                method.access_flags,
                pretty_access_flags(method.access_flags, AccessTarget::Method)
            )?;
            writeln!(out, "\t\tclass_idx={:#x}", method_id.class_idx)?;
            writeln!(out, "\t\tproto_idx={:#x}", method_id.proto_idx)?;
            if let Some(code) = &method.code {
                writeln!(
                    out,
                    "\t\tregisters={} ins={} outs={} tries={} insns={}",
                    code.registers_size,
                    code.ins_size,
                    code.outs_size,
                    code.tries_size,
                    code.insns_size
                )?;
            }
        }
        Ok(())
    }
}
