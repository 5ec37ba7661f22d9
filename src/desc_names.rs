/// Converts a type descriptor into its Java source form, e.g.
/// `[Ljava/lang/String;` becomes `java.lang.String[]`. Descriptors that are
/// not understood are returned as they are.
pub fn pretty_desc(desc: &str) -> String {
    let dim = desc.chars().take_while(|c| *c == '[').count();
    let name = &desc[dim..];
    let mut output = String::new();

    if let Some(class_name) = name.strip_prefix('L') {
        let class_name = class_name.strip_suffix(';').unwrap_or(class_name);
        output.push_str(&class_name.replace('/', "."));
    } else {
        output.push_str(match name.as_bytes().first() {
            Some(b'B') if name.len() == 1 => "byte",
            Some(b'C') if name.len() == 1 => "char",
            Some(b'D') if name.len() == 1 => "double",
            Some(b'F') if name.len() == 1 => "float",
            Some(b'I') if name.len() == 1 => "int",
            Some(b'J') if name.len() == 1 => "long",
            Some(b'S') if name.len() == 1 => "short",
            Some(b'Z') if name.len() == 1 => "boolean",
            Some(b'V') if name.len() == 1 => "void",
            _ => name,
        });
    }

    if dim > 0 {
        output.push_str(&"[]".repeat(dim));
    }
    output
}
