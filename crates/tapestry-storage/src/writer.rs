use std::fmt::Write as _;

/// Attribute list for one element. `None` values are skipped.
#[derive(Default)]
pub struct Attrs(Vec<(&'static str, String)>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.0.push((name, value.to_string()));
        self
    }

    pub fn with_opt<T: ToString>(mut self, name: &'static str, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.0.push((name, value.to_string()));
        }
        self
    }
}

/// Streaming XML writer with optional two-space indentation.
pub struct XmlWriter {
    out: String,
    indent: bool,
    depth: usize,
}

impl XmlWriter {
    pub fn new(indent: bool) -> Self {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        if indent {
            out.push('\n');
        }
        Self {
            out,
            indent,
            depth: 0,
        }
    }

    pub fn finish(mut self) -> String {
        if self.indent && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out
    }

    fn pad(&mut self) {
        if self.indent {
            for _ in 0..self.depth {
                self.out.push_str("  ");
            }
        }
    }

    fn newline(&mut self) {
        if self.indent {
            self.out.push('\n');
        }
    }

    fn tag(&mut self, name: &str, attrs: &Attrs) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in &attrs.0 {
            let _ = write!(self.out, " {}=\"{}\"", key, escape(value));
        }
    }

    pub fn open(&mut self, name: &str, attrs: Attrs) {
        self.pad();
        self.tag(name, &attrs);
        self.out.push('>');
        self.newline();
        self.depth += 1;
    }

    pub fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.pad();
        let _ = write!(self.out, "</{name}>");
        self.newline();
    }

    pub fn leaf(&mut self, name: &str, attrs: Attrs) {
        self.pad();
        self.tag(name, &attrs);
        self.out.push_str(" />");
        self.newline();
    }

    pub fn text_leaf(&mut self, name: &str, attrs: Attrs, text: &str) {
        self.pad();
        self.tag(name, &attrs);
        self.out.push('>');
        self.out.push_str(&escape(text));
        let _ = write!(self.out, "</{name}>");
        self.newline();
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
