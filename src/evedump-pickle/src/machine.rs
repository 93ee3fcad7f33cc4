//! Stack machine that executes a pickle opcode stream

use std::collections::HashMap;

use crate::opcodes::*;
use crate::reader::Reader;
use crate::value::{deref, legacy_text, nesting_exceeds, Object, Value, MAX_DEPTH};
use crate::{Error, Result, HIGHEST_PROTOCOL};

pub struct Machine<'a> {
    reader: Reader<'a>,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: HashMap<u32, Value>,
    /// Offset of the opcode being executed, for error reporting
    op_offset: usize,
}

impl<'a> Machine<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(data),
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            op_offset: 0,
        }
    }

    /// Execute until STOP, returning the top of stack and the memo it refers into
    pub fn run(mut self) -> Result<(Value, HashMap<u32, Value>)> {
        while !self.reader.is_empty() {
            self.op_offset = self.reader.offset();
            let opcode = self.reader.read_u8()?;
            if opcode == STOP {
                let result = self.pop()?;
                return Ok((result, self.memo));
            }
            self.step(opcode)?;
        }
        Err(Error::MissingStop)
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, opcode: u8) -> Result<()> {
        match opcode {
            PROTO => {
                let version = self.reader.read_u8()?;
                if version > HIGHEST_PROTOCOL {
                    return Err(Error::UnsupportedProtocol(version));
                }
            }
            FRAME => {
                self.reader.read_u64()?;
            }

            MARK => self.marks.push(self.stack.len()),
            POP => {
                if self.marks.last() == Some(&self.stack.len()) {
                    self.marks.pop();
                } else {
                    self.pop()?;
                }
            }
            POP_MARK => {
                self.pop_mark()?;
            }
            DUP => {
                let top = self.top()?.clone();
                self.stack.push(top);
            }

            NONE => self.stack.push(Value::None),
            NEWTRUE => self.stack.push(Value::Bool(true)),
            NEWFALSE => self.stack.push(Value::Bool(false)),
            INT => {
                let line = self.read_text_line()?;
                let value = match line.as_str() {
                    "00" => Value::Bool(false),
                    "01" => Value::Bool(true),
                    text => Value::Int(self.parse_int("INT", text)?),
                };
                self.stack.push(value);
            }
            LONG => {
                let line = self.read_text_line()?;
                let text = line.strip_suffix('L').unwrap_or(line.as_str());
                let value = self.parse_int("LONG", text)?;
                self.stack.push(Value::Int(value));
            }
            BININT => {
                let v = self.reader.read_i32()?;
                self.stack.push(Value::Int(v as i128));
            }
            BININT1 => {
                let v = self.reader.read_u8()?;
                self.stack.push(Value::Int(v as i128));
            }
            BININT2 => {
                let v = self.reader.read_u16()?;
                self.stack.push(Value::Int(v as i128));
            }
            LONG1 => {
                let len = self.reader.read_u8()? as usize;
                let bytes = self.reader.read_bytes(len)?;
                self.stack.push(Value::Int(decode_long(bytes)?));
            }
            LONG4 => {
                let len = self.reader.read_i32()?;
                let len = usize::try_from(len).map_err(|_| Error::InvalidLiteral {
                    kind: "LONG4 length",
                    text: len.to_string(),
                    offset: self.op_offset,
                })?;
                let bytes = self.reader.read_bytes(len)?;
                self.stack.push(Value::Int(decode_long(bytes)?));
            }
            FLOAT => {
                let line = self.read_text_line()?;
                let value = line.trim().parse::<f64>().map_err(|_| Error::InvalidLiteral {
                    kind: "FLOAT",
                    text: line.clone(),
                    offset: self.op_offset,
                })?;
                self.stack.push(Value::Float(value));
            }
            BINFLOAT => {
                let v = self.reader.read_f64_be()?;
                self.stack.push(Value::Float(v));
            }

            STRING => {
                let line = self.reader.read_line()?;
                let bytes = unquote(line).ok_or_else(|| Error::InvalidLiteral {
                    kind: "STRING",
                    text: legacy_text(line),
                    offset: self.op_offset,
                })?;
                self.stack.push(Value::Str(legacy_text(&bytes)));
            }
            BINSTRING => {
                let len = self.reader.read_i32()?;
                let len = usize::try_from(len).map_err(|_| Error::InvalidLiteral {
                    kind: "BINSTRING length",
                    text: len.to_string(),
                    offset: self.op_offset,
                })?;
                let bytes = self.reader.read_bytes(len)?;
                self.stack.push(Value::Str(legacy_text(bytes)));
            }
            SHORT_BINSTRING => {
                let bytes = self.reader.read_counted(1)?;
                self.stack.push(Value::Str(legacy_text(bytes)));
            }
            UNICODE => {
                let line = self.reader.read_line()?;
                self.stack.push(Value::Str(raw_unicode_unescape(line)));
            }
            SHORT_BINUNICODE => self.push_utf8(1)?,
            BINUNICODE => self.push_utf8(4)?,
            BINUNICODE8 => self.push_utf8(8)?,
            SHORT_BINBYTES => self.push_bytes(1)?,
            BINBYTES => self.push_bytes(4)?,
            BINBYTES8 | BYTEARRAY8 => self.push_bytes(8)?,

            EMPTY_TUPLE => self.stack.push(Value::Tuple(Vec::new())),
            TUPLE1 | TUPLE2 | TUPLE3 => {
                let n = (opcode - TUPLE1 + 1) as usize;
                if self.stack.len() < n {
                    return Err(Error::StackUnderflow {
                        offset: self.op_offset,
                    });
                }
                let items = self.stack.split_off(self.stack.len() - n);
                self.stack.push(nested(Value::Tuple(items))?);
            }
            TUPLE => {
                let items = self.pop_mark()?;
                self.stack.push(nested(Value::Tuple(items))?);
            }
            EMPTY_LIST => self.stack.push(Value::List(Vec::new())),
            LIST => {
                let items = self.pop_mark()?;
                self.stack.push(nested(Value::List(items))?);
            }
            EMPTY_DICT => self.stack.push(Value::Dict(Vec::new())),
            DICT => {
                let items = self.pop_mark()?;
                let pairs = self.pair_up(items)?;
                self.stack.push(nested(Value::Dict(pairs))?);
            }
            EMPTY_SET => self.stack.push(Value::Set(Vec::new())),
            FROZENSET => {
                let items = self.pop_mark()?;
                self.stack.push(nested(Value::Set(items))?);
            }

            APPEND => {
                let item = self.pop()?;
                self.extend_sequence("APPEND", vec![item])?;
            }
            APPENDS => {
                let items = self.pop_mark()?;
                self.extend_sequence("APPENDS", items)?;
            }
            SETITEM => {
                let value = self.pop()?;
                let key = self.pop()?;
                self.extend_mapping("SETITEM", vec![(key, value)])?;
            }
            SETITEMS => {
                let items = self.pop_mark()?;
                let pairs = self.pair_up(items)?;
                self.extend_mapping("SETITEMS", pairs)?;
            }
            ADDITEMS => {
                let items = self.pop_mark()?;
                check_nesting(&items)?;
                let offset = self.op_offset;
                match self.top_mut()? {
                    Value::Set(set) => set.extend(items),
                    other => {
                        return Err(Error::InvalidTarget {
                            op: "ADDITEMS",
                            target: other.kind(),
                            offset,
                        })
                    }
                }
            }

            GLOBAL => {
                let module = self.read_text_line()?;
                let name = self.read_text_line()?;
                self.stack.push(Value::Global { module, name });
            }
            STACK_GLOBAL => {
                let name = self.pop_text("STACK_GLOBAL")?;
                let module = self.pop_text("STACK_GLOBAL")?;
                self.stack.push(Value::Global { module, name });
            }
            REDUCE => {
                let args = self.pop()?;
                let callable = self.pop()?;
                let args = self.sequence_items(&args)?;
                let value = nested(self.construct(&callable, args)?)?;
                self.stack.push(value);
            }
            NEWOBJ => {
                let args = self.pop()?;
                let class = self.pop()?;
                let args = self.sequence_items(&args)?;
                let value = nested(self.construct(&class, args)?)?;
                self.stack.push(value);
            }
            NEWOBJ_EX => {
                let kwargs = self.pop()?;
                let args = self.pop()?;
                let class = self.pop()?;
                let mut args = self.sequence_items(&args)?;
                if !matches!(deref(&kwargs, &self.memo)?, Value::Dict(d) if d.is_empty()) {
                    args.push(kwargs);
                }
                let value = nested(self.construct(&class, args)?)?;
                self.stack.push(value);
            }
            OBJ => {
                let mut items = self.pop_mark()?;
                if items.is_empty() {
                    return Err(Error::StackUnderflow {
                        offset: self.op_offset,
                    });
                }
                let class = items.remove(0);
                let value = nested(self.construct(&class, items)?)?;
                self.stack.push(value);
            }
            INST => {
                let module = self.read_text_line()?;
                let name = self.read_text_line()?;
                let args = self.pop_mark()?;
                let value = nested(self.construct(&Value::Global { module, name }, args)?)?;
                self.stack.push(value);
            }
            BUILD => {
                let state = self.pop()?;
                self.apply_state(state)?;
            }

            PUT => {
                let id = self.read_memo_id()?;
                self.memoize(id)?;
            }
            BINPUT => {
                let id = self.reader.read_u8()? as u32;
                self.memoize(id)?;
            }
            LONG_BINPUT => {
                let id = self.reader.read_u32()?;
                self.memoize(id)?;
            }
            MEMOIZE => {
                let id = self.memo.len() as u32;
                self.memoize(id)?;
            }
            GET => {
                let id = self.read_memo_id()?;
                self.push_memo(id)?;
            }
            BINGET => {
                let id = self.reader.read_u8()? as u32;
                self.push_memo(id)?;
            }
            LONG_BINGET => {
                let id = self.reader.read_u32()?;
                self.push_memo(id)?;
            }

            other => {
                return Err(match unsupported_name(other) {
                    Some(name) => Error::UnsupportedOpcode {
                        name,
                        offset: self.op_offset,
                    },
                    None => Error::UnknownOpcode {
                        opcode: other,
                        offset: self.op_offset,
                    },
                })
            }
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() <= floor {
            return Err(Error::StackUnderflow {
                offset: self.op_offset,
            });
        }
        self.stack.pop().ok_or(Error::StackUnderflow {
            offset: self.op_offset,
        })
    }

    fn pop_mark(&mut self) -> Result<Vec<Value>> {
        let mark = self.marks.pop().ok_or(Error::MissingMark {
            offset: self.op_offset,
        })?;
        Ok(self.stack.split_off(mark))
    }

    fn top(&self) -> Result<&Value> {
        self.stack.last().ok_or(Error::StackUnderflow {
            offset: self.op_offset,
        })
    }

    /// Mutable access to the top of stack, through the memo if it is a reference
    fn top_mut(&mut self) -> Result<&mut Value> {
        let idx = self.stack.len().checked_sub(1).ok_or(Error::StackUnderflow {
            offset: self.op_offset,
        })?;
        if let Value::Ref(id) = self.stack[idx] {
            return memo_target(&mut self.memo, id);
        }
        Ok(&mut self.stack[idx])
    }

    fn read_text_line(&mut self) -> Result<String> {
        let line = self.reader.read_line()?;
        Ok(legacy_text(line).trim_end_matches('\r').to_string())
    }

    fn read_memo_id(&mut self) -> Result<u32> {
        let line = self.read_text_line()?;
        line.trim().parse::<u32>().map_err(|_| Error::InvalidLiteral {
            kind: "memo index",
            text: line.clone(),
            offset: self.op_offset,
        })
    }

    fn parse_int(&self, kind: &'static str, text: &str) -> Result<i128> {
        text.trim().parse::<i128>().map_err(|_| Error::InvalidLiteral {
            kind,
            text: text.to_string(),
            offset: self.op_offset,
        })
    }

    fn push_utf8(&mut self, width: usize) -> Result<()> {
        let bytes = self.reader.read_counted(width)?;
        self.stack
            .push(Value::Str(String::from_utf8_lossy(bytes).into_owned()));
        Ok(())
    }

    fn push_bytes(&mut self, width: usize) -> Result<()> {
        let bytes = self.reader.read_counted(width)?;
        self.stack.push(Value::Bytes(bytes.to_vec()));
        Ok(())
    }

    fn pop_text(&mut self, op: &'static str) -> Result<String> {
        let value = self.pop()?;
        match deref(&value, &self.memo)? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(Error::InvalidTarget {
                op,
                target: other.kind(),
                offset: self.op_offset,
            }),
        }
    }

    fn pair_up(&self, items: Vec<Value>) -> Result<Vec<(Value, Value)>> {
        if items.len() % 2 != 0 {
            return Err(Error::OddDictItems {
                offset: self.op_offset,
            });
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            pairs.push((k, v));
        }
        Ok(pairs)
    }

    /// Owned copy of the elements of a tuple or list argument
    fn sequence_items(&self, value: &Value) -> Result<Vec<Value>> {
        match deref(value, &self.memo)? {
            Value::Tuple(items) | Value::List(items) | Value::Set(items) => Ok(items.clone()),
            Value::None => Ok(Vec::new()),
            other => Err(Error::InvalidTarget {
                op: "argument unpacking",
                target: other.kind(),
                offset: self.op_offset,
            }),
        }
    }

    fn extend_sequence(&mut self, op: &'static str, items: Vec<Value>) -> Result<()> {
        check_nesting(&items)?;
        let offset = self.op_offset;
        match self.top_mut()? {
            Value::List(list) => list.extend(items),
            Value::Set(set) => set.extend(items),
            Value::Object(obj) => obj.elements.extend(items),
            other => {
                return Err(Error::InvalidTarget {
                    op,
                    target: other.kind(),
                    offset,
                })
            }
        }
        Ok(())
    }

    fn extend_mapping(&mut self, op: &'static str, pairs: Vec<(Value, Value)>) -> Result<()> {
        check_nesting(pairs.iter().flat_map(|(k, v)| [k, v]))?;
        let offset = self.op_offset;
        match self.top_mut()? {
            Value::Dict(dict) => dict.extend(pairs),
            Value::Object(obj) => obj.items.extend(pairs),
            other => {
                return Err(Error::InvalidTarget {
                    op,
                    target: other.kind(),
                    offset,
                })
            }
        }
        Ok(())
    }

    fn apply_state(&mut self, state: Value) -> Result<()> {
        let offset = self.op_offset;
        if matches!(self.top_mut()?, Value::Dict(_)) {
            let pairs = match deref(&state, &self.memo)? {
                Value::Dict(pairs) => pairs.clone(),
                other => {
                    return Err(Error::InvalidTarget {
                        op: "BUILD",
                        target: other.kind(),
                        offset,
                    })
                }
            };
            if let Value::Dict(dict) = self.top_mut()? {
                dict.extend(pairs);
            }
            return Ok(());
        }

        match self.top_mut()? {
            Value::Object(_) if nesting_exceeds(&state, MAX_DEPTH - 1) => {
                Err(Error::RecursionLimit(MAX_DEPTH))
            }
            Value::Object(obj) => {
                obj.state = Some(state);
                Ok(())
            }
            other => Err(Error::InvalidTarget {
                op: "BUILD",
                target: other.kind(),
                offset,
            }),
        }
    }

    fn memoize(&mut self, id: u32) -> Result<()> {
        let idx = self.stack.len().checked_sub(1).ok_or(Error::StackUnderflow {
            offset: self.op_offset,
        })?;
        let value = std::mem::replace(&mut self.stack[idx], Value::Ref(id));
        // Re-memoizing a reference aliases the slot; a self alias would loop
        if value != Value::Ref(id) {
            self.memo.insert(id, value);
        }
        Ok(())
    }

    fn push_memo(&mut self, id: u32) -> Result<()> {
        if !self.memo.contains_key(&id) {
            return Err(Error::MissingMemo(id));
        }
        self.stack.push(Value::Ref(id));
        Ok(())
    }

    /// Materialize a callable applied to its arguments
    ///
    /// Builtin containers become plain values; anything else is kept as a
    /// generic [`Object`] tagged with its qualified class name.
    fn construct(&self, callable: &Value, args: Vec<Value>) -> Result<Value> {
        let qualified = match deref(callable, &self.memo)? {
            Value::Global { module, name } => format!("{}.{}", module, name),
            _ => "<callable>".to_string(),
        };

        let builtin = match qualified.as_str() {
            "__builtin__.set" | "builtins.set" | "__builtin__.frozenset" | "builtins.frozenset" => {
                Some(Value::Set(self.first_items(&args)?))
            }
            "__builtin__.list" | "builtins.list" => Some(Value::List(self.first_items(&args)?)),
            "__builtin__.tuple" | "builtins.tuple" => Some(Value::Tuple(self.first_items(&args)?)),
            "__builtin__.dict" | "builtins.dict" | "collections.OrderedDict" => {
                Some(Value::Dict(self.first_pairs(&args)?))
            }
            // First argument is the default factory, items follow via SETITEMS
            "collections.defaultdict" => Some(Value::Dict(Vec::new())),
            // Protocol 2 spelling of a Python 3 bytes object
            "_codecs.encode" => match self.first_arg(&args)? {
                Some(Value::Str(text)) => Some(Value::Bytes(latin1_bytes(text))),
                _ => None,
            },
            "__builtin__.bytearray" | "builtins.bytearray" | "__builtin__.bytes" | "builtins.bytes" => {
                match self.first_arg(&args)? {
                    Some(Value::Bytes(bytes)) => Some(Value::Bytes(bytes.clone())),
                    Some(Value::Str(text)) => Some(Value::Bytes(latin1_bytes(text))),
                    None => Some(Value::Bytes(Vec::new())),
                    _ => None,
                }
            }
            "copy_reg._reconstructor" | "copyreg._reconstructor" => {
                let class = self.class_name(args.first())?;
                let state = match args.get(2) {
                    Some(s) if !matches!(deref(s, &self.memo)?, Value::None) => Some(s.clone()),
                    _ => None,
                };
                Some(Value::Object(Box::new(Object {
                    class,
                    state,
                    ..Object::default()
                })))
            }
            "copy_reg.__newobj__" | "copyreg.__newobj__" => {
                let class = self.class_name(args.first())?;
                Some(Value::Object(Box::new(Object {
                    class,
                    args: args.iter().skip(1).cloned().collect(),
                    ..Object::default()
                })))
            }
            _ => None,
        };

        Ok(builtin.unwrap_or_else(|| generic_object(qualified, args)))
    }

    fn first_arg<'v>(&'v self, args: &'v [Value]) -> Result<Option<&'v Value>> {
        args.first().map(|a| deref(a, &self.memo)).transpose()
    }

    fn class_name(&self, value: Option<&Value>) -> Result<String> {
        Ok(match value.map(|v| deref(v, &self.memo)).transpose()? {
            Some(Value::Global { module, name }) => format!("{}.{}", module, name),
            _ => "<callable>".to_string(),
        })
    }

    fn first_items(&self, args: &[Value]) -> Result<Vec<Value>> {
        match args.first() {
            Some(first) => self.sequence_items(first),
            None => Ok(Vec::new()),
        }
    }

    /// Initial content for dict constructors: a dict or a sequence of pairs
    fn first_pairs(&self, args: &[Value]) -> Result<Vec<(Value, Value)>> {
        let Some(first) = args.first() else {
            return Ok(Vec::new());
        };
        match deref(first, &self.memo)? {
            Value::Dict(pairs) => Ok(pairs.clone()),
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(|item| match deref(item, &self.memo)? {
                    Value::List(kv) | Value::Tuple(kv) if kv.len() == 2 => {
                        Ok((kv[0].clone(), kv[1].clone()))
                    }
                    other => Err(Error::InvalidTarget {
                        op: "dict construction",
                        target: other.kind(),
                        offset: self.op_offset,
                    }),
                })
                .collect(),
            other => Err(Error::InvalidTarget {
                op: "dict construction",
                target: other.kind(),
                offset: self.op_offset,
            }),
        }
    }
}

fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u8).collect()
}

fn generic_object(class: String, args: Vec<Value>) -> Value {
    Value::Object(Box::new(Object {
        class,
        args,
        ..Object::default()
    }))
}

/// Reject a freshly built container that nests past [`MAX_DEPTH`]
///
/// Every owned tree stays within the limit, so dropping or cloning one never
/// recurses deeper than that.
fn nested(value: Value) -> Result<Value> {
    if nesting_exceeds(&value, MAX_DEPTH) {
        return Err(Error::RecursionLimit(MAX_DEPTH));
    }
    Ok(value)
}

/// Reject values about to be inserted into an existing container
fn check_nesting<'a>(items: impl IntoIterator<Item = &'a Value>) -> Result<()> {
    if items
        .into_iter()
        .any(|item| nesting_exceeds(item, MAX_DEPTH - 1))
    {
        return Err(Error::RecursionLimit(MAX_DEPTH));
    }
    Ok(())
}

fn memo_target(memo: &mut HashMap<u32, Value>, id: u32) -> Result<&mut Value> {
    let mut target = id;
    let mut hops = 0;
    while let Some(Value::Ref(next)) = memo.get(&target) {
        target = *next;
        hops += 1;
        if hops > memo.len() {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }
    }
    memo.get_mut(&target).ok_or(Error::MissingMemo(target))
}

/// Little-endian two's complement integer as written by LONG1/LONG4
fn decode_long(bytes: &[u8]) -> Result<i128> {
    if bytes.len() > 16 {
        return Err(Error::IntegerTooWide(bytes.len()));
    }
    if bytes.is_empty() {
        return Ok(0);
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    let mut buf = if negative { [0xffu8; 16] } else { [0u8; 16] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i128::from_le_bytes(buf))
}

/// Undo the `repr()` quoting used by the text STRING opcode
fn unquote(line: &[u8]) -> Option<Vec<u8>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() < 2 {
        return None;
    }
    let quote = line[0];
    if (quote != b'\'' && quote != b'"') || line[line.len() - 1] != quote {
        return None;
    }
    let body = &line[1..line.len() - 1];

    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let esc = *body.get(i + 1)?;
        i += 2;
        match esc {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' | b'\'' | b'"' => out.push(esc),
            b'x' => {
                let hex = body.get(i..i + 2)?;
                out.push(u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?);
                i += 2;
            }
            b'0'..=b'7' => {
                let mut value = (esc - b'0') as u32;
                let mut digits = 1;
                while digits < 3 {
                    match body.get(i) {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Decode Python's `raw-unicode-escape` codec used by the UNICODE opcode
fn raw_unicode_unescape(line: &[u8]) -> String {
    let mut units: Vec<u32> = Vec::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'\\' && i + 1 < line.len() {
            let width = match line[i + 1] {
                b'u' => 4,
                b'U' => 8,
                _ => 0,
            };
            if width > 0 {
                if let Some(code) = line
                    .get(i + 2..i + 2 + width)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                {
                    units.push(code);
                    i += 2 + width;
                    continue;
                }
            }
        }
        units.push(line[i] as u32);
        i += 1;
    }

    let mut out = String::with_capacity(units.len());
    let mut iter = units.into_iter().peekable();
    while let Some(unit) = iter.next() {
        if (0xd800..0xdc00).contains(&unit) {
            if let Some(&low) = iter.peek() {
                if (0xdc00..0xe000).contains(&low) {
                    iter.next();
                    let combined = 0x10000 + ((unit - 0xd800) << 10) + (low - 0xdc00);
                    out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                    continue;
                }
            }
        }
        out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out
}
