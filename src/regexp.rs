use crate::*;
use fancy_regex::Regex as FancyRegex;
use regex::bytes::RegexBuilder as ByteRegexBuilder;
use std::cell::RefCell;
use std::rc::Rc;

///
/// Compile-time regexp options.
///
/// `multiline` is Ruby's `m`: dot matches newline.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegexpOptions {
    pub ignore_case: bool,
    pub multiline: bool,
    pub extended: bool,
    pub fixed_encoding: bool,
    pub no_encoding: bool,
}

impl RegexpOptions {
    pub const IGNORECASE: u8 = 1;
    pub const EXTENDED: u8 = 2;
    pub const MULTILINE: u8 = 4;
    pub const FIXEDENCODING: u8 = 16;
    pub const NOENCODING: u8 = 32;

    pub fn from_bits(bits: u8) -> Self {
        RegexpOptions {
            ignore_case: bits & Self::IGNORECASE != 0,
            extended: bits & Self::EXTENDED != 0,
            multiline: bits & Self::MULTILINE != 0,
            fixed_encoding: bits & Self::FIXEDENCODING != 0,
            no_encoding: bits & Self::NOENCODING != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.ignore_case {
            bits |= Self::IGNORECASE;
        }
        if self.extended {
            bits |= Self::EXTENDED;
        }
        if self.multiline {
            bits |= Self::MULTILINE;
        }
        if self.fixed_encoding {
            bits |= Self::FIXEDENCODING;
        }
        if self.no_encoding {
            bits |= Self::NOENCODING;
        }
        bits
    }

    fn flag_prefix(&self) -> String {
        let mut prefix = String::new();
        if self.ignore_case {
            prefix.push_str("(?i)");
        }
        if self.multiline {
            prefix.push_str("(?s)");
        }
        if self.extended {
            prefix.push_str("(?x)");
        }
        prefix
    }
}

/// Key of the process-wide compile cache and of the instrument counters.
pub type RegexpCacheKey = (Box<[u8]>, u8, u8);

pub(crate) fn cache_key(source: &Rope, encoding: EncodingRef, options: RegexpOptions) -> RegexpCacheKey {
    (
        source.as_bytes().to_vec().into_boxed_slice(),
        encoding.index(),
        options.bits(),
    )
}

///
/// A compiled backtracking matcher for one encoding.
///
pub struct SlowMatcher {
    pub regex: FancyRegex,
    pub encoding: EncodingRef,
}

impl std::fmt::Debug for SlowMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlowMatcher({}, {:?})", self.regex.as_str(), self.encoding)
    }
}

/// A compiled linear-time matcher. Only built for a limited set of
/// encodings and pattern features.
#[derive(Debug)]
pub struct FastMatcher {
    pub regex: regex::bytes::Regex,
}

#[derive(Debug, Clone)]
enum FastSlot {
    Empty,
    /// Compilation was attempted and the pattern or encoding is out of
    /// the fast path's reach; never retried.
    Unsupported,
    Ready(Rc<FastMatcher>),
}

/// Encodings the fast path covers, in slot order.
const FAST_ENCODINGS: [EncodingRef; 4] = [
    EncodingRef::US_ASCII,
    EncodingRef::ISO_8859_1,
    EncodingRef::UTF_8,
    EncodingRef::ASCII_8BIT,
];

fn fast_slot_index(enc: EncodingRef) -> Option<usize> {
    FAST_ENCODINGS.iter().position(|e| *e == enc)
}

#[derive(Debug)]
pub struct RegexpInner {
    source: Rope,
    options: RegexpOptions,
    effective: EncodingRef,
    /// Fixed either by an explicit option or by encoding-forcing escapes.
    fixed: bool,
    primary: Rc<SlowMatcher>,
    enc_cache: RefCell<FxHashMap<u8, Rc<SlowMatcher>>>,
    fast_cache: RefCell<[FastSlot; 4]>,
}

///
/// A compiled regular expression.
///
/// Shares one compiled body between clones; equal sources compare equal.
///
#[derive(Clone)]
pub struct RegexpInfo(Rc<RegexpInner>);

impl std::fmt::Debug for RegexpInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/", self.0.source)
    }
}

impl PartialEq for RegexpInfo {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        self.0.source == other.0.source && self.0.options == other.0.options
    }
}

impl std::ops::Deref for RegexpInfo {
    type Target = RegexpInner;
    fn deref(&self) -> &RegexpInner {
        &self.0
    }
}

// Compilation.
impl RegexpInfo {
    pub fn from_string(vm: &mut VM, source: &str) -> Result<Self, RubyError> {
        Self::compile(
            vm,
            Rope::from_str(source, EncodingRef::UTF_8),
            RegexpOptions::default(),
        )
    }

    pub fn from_escaped(vm: &mut VM, escaped: &str) -> Result<Self, RubyError> {
        let quoted = regex::escape(escaped);
        Self::from_string(vm, &quoted)
    }

    /// Compile `source` under `options`, resolving the effective encoding
    /// and consulting the process-wide compile cache.
    pub fn compile(vm: &mut VM, source: Rope, options: RegexpOptions) -> Result<Self, RubyError> {
        let src_text = decode_pattern(&source)?;
        let forced = forced_encoding(&src_text);
        let effective = if options.no_encoding {
            EncodingRef::ASCII_8BIT
        } else if let Some(forced) = forced {
            if forced != source.encoding() && !source.is_7bit() {
                return Err(RubyError::regexp(format!(
                    "regexp encodings differ. ({} and {})",
                    forced.name(),
                    source.encoding().name()
                )));
            }
            forced
        } else {
            source.encoding()
        };
        let fixed = options.fixed_encoding || forced.is_some();
        let primary = compile_slow(vm, &source, effective, options)?;
        Ok(RegexpInfo(Rc::new(RegexpInner {
            source,
            options,
            effective,
            fixed,
            primary,
            enc_cache: RefCell::new(FxHashMap::default()),
            fast_cache: RefCell::new([
                FastSlot::Empty,
                FastSlot::Empty,
                FastSlot::Empty,
                FastSlot::Empty,
            ]),
        })))
    }

    pub fn source(&self) -> &Rope {
        &self.0.source
    }

    pub fn options(&self) -> RegexpOptions {
        self.0.options
    }

    pub fn effective_encoding(&self) -> EncodingRef {
        self.0.effective
    }

    pub fn as_str(&self) -> String {
        self.0.source.to_string_lossy()
    }

    /// Index of a named capture group in the compiled form.
    pub fn named_group(&self, name: &str) -> Option<usize> {
        self.0
            .primary
            .regex
            .capture_names()
            .position(|n| n == Some(name))
    }

    /// The slow-path matcher for `encoding`, compiling a variant into the
    /// per-regexp encoding cache when the primary does not fit.
    pub(crate) fn slow_matcher_for(
        &self,
        vm: &mut VM,
        encoding: EncodingRef,
    ) -> Result<Rc<SlowMatcher>, RubyError> {
        if encoding == self.0.primary.encoding {
            return Ok(self.0.primary.clone());
        }
        if let Some(m) = self.0.enc_cache.borrow().get(&encoding.index()) {
            return Ok(m.clone());
        }
        let compiled = compile_slow(vm, &self.0.source, encoding, self.0.options)?;
        self.0
            .enc_cache
            .borrow_mut()
            .insert(encoding.index(), compiled.clone());
        Ok(compiled)
    }

    /// The fast-path matcher for `encoding`, or None when the encoding or
    /// the pattern is outside the fast path's contract. The failure is
    /// cached so the pattern is never re-inspected.
    pub(crate) fn fast_matcher_for(&self, encoding: EncodingRef) -> Option<Rc<FastMatcher>> {
        let slot = fast_slot_index(encoding)?;
        let cached = self.0.fast_cache.borrow()[slot].clone();
        match cached {
            FastSlot::Ready(m) => Some(m),
            FastSlot::Unsupported => None,
            FastSlot::Empty => {
                let compiled = compile_fast(&self.0.source, encoding, self.0.options);
                let (entry, res) = match compiled {
                    Some(m) => {
                        let m = Rc::new(m);
                        (FastSlot::Ready(m.clone()), Some(m))
                    }
                    None => (FastSlot::Unsupported, None),
                };
                self.0.fast_cache.borrow_mut()[slot] = entry;
                res
            }
        }
    }

    /// Encoding negotiation for a match against `subject`.
    ///
    /// Returns None when the negotiation already decided there can be no
    /// match (a fixed-encoding regexp over bytes invalid under it).
    pub fn select_encoding(&self, subject: &Rope) -> Result<Option<EncodingRef>, RubyError> {
        let e_r = self.0.effective;
        let e_s = subject.encoding();
        if e_r == e_s {
            return Ok(Some(e_r));
        }
        if e_r == EncodingRef::US_ASCII && subject.code_range() == CodeRange::SevenBit {
            return Ok(Some(EncodingRef::US_ASCII));
        }
        if self.0.fixed && e_s.is_ascii_compatible() {
            if !e_r.is_valid(subject.as_bytes()) {
                #[cfg(feature = "trace")]
                eprintln!(
                    "regexp: subject is broken under fixed encoding {}.",
                    e_r.name()
                );
                return Ok(None);
            }
            return Ok(Some(e_r));
        }
        if e_s.is_dummy() {
            return Err(RubyError::argument(format!(
                "can not match against a dummy encoding. ({})",
                e_s.name()
            )));
        }
        Ok(Some(e_s))
    }
}

fn decode_pattern(source: &Rope) -> Result<String, RubyError> {
    match source.encoding() {
        EncodingRef::ISO_8859_1 | EncodingRef::ASCII_8BIT => {
            Ok(source.as_bytes().iter().map(|b| *b as char).collect())
        }
        _ => match std::str::from_utf8(source.as_bytes()) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(RubyError::regexp(
                "invalid byte sequence in regexp source.",
            )),
        },
    }
}

/// Escapes in the source that force a specific encoding: `\u` forces
/// UTF-8.
fn forced_encoding(src: &str) -> Option<EncodingRef> {
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('u') => return Some(EncodingRef::UTF_8),
                Some(_) => {}
                None => break,
            }
        }
    }
    None
}

/// Resolve Ruby-specific escape forms the backing engines do not know.
fn preprocess_pattern(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('h') => {
                    if in_class {
                        out.push_str("0-9a-fA-F");
                    } else {
                        out.push_str("[0-9a-fA-F]");
                    }
                }
                Some('H') => {
                    if in_class {
                        out.push_str("^0-9a-fA-F");
                    } else {
                        out.push_str("[^0-9a-fA-F]");
                    }
                }
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '[' => {
                in_class = true;
                out.push(c);
            }
            ']' => {
                in_class = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Pattern features only the backtracking engine accepts.
fn needs_backtracking(src: &str) -> bool {
    let mut chars: Vec<char> = src.chars().collect();
    chars.push('\0');
    let mut i = 0;
    while i < chars.len() - 1 {
        match chars[i] {
            '\\' => {
                // Backreferences.
                if chars[i + 1].is_ascii_digit() && chars[i + 1] != '0' {
                    return true;
                }
                if chars[i + 1] == 'k' || chars[i + 1] == 'g' || chars[i + 1] == 'G' {
                    return true;
                }
                i += 2;
                continue;
            }
            '(' => {
                if chars[i + 1] == '?' {
                    match chars.get(i + 2) {
                        // Lookahead, conditionals, atomic groups.
                        Some('=') | Some('!') | Some('(') | Some('>') => return true,
                        Some('<') => match chars.get(i + 3) {
                            // Lookbehind; (?<name>) is a plain named group.
                            Some('=') | Some('!') => return true,
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }
            '*' | '+' | '?' => {
                // Possessive quantifiers.
                if chars[i + 1] == '+' {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

fn compile_slow(
    vm: &mut VM,
    source: &Rope,
    encoding: EncodingRef,
    options: RegexpOptions,
) -> Result<Rc<SlowMatcher>, RubyError> {
    let key = cache_key(source, encoding, options);
    if let Some(m) = vm.globals.regexp_cache.get(&key) {
        return Ok(m.clone());
    }
    let src_text = decode_pattern(source)?;
    let pattern = format!("{}{}", options.flag_prefix(), preprocess_pattern(&src_text));
    let regex =
        FancyRegex::new(&pattern).map_err(|err| RubyError::regexp_compile(err, &src_text))?;
    let compiled = Rc::new(SlowMatcher { regex, encoding });
    vm.globals.regexp_cache.insert(key.clone(), compiled.clone());
    if vm.globals.options.regexp_instrument_creation {
        *vm.globals.regexp_stats.compiled.entry(key).or_insert(0) += 1;
    }
    Ok(compiled)
}

fn compile_fast(source: &Rope, encoding: EncodingRef, options: RegexpOptions) -> Option<FastMatcher> {
    let src_text = decode_pattern(source).ok()?;
    if needs_backtracking(&src_text) {
        return None;
    }
    let pattern = format!("{}{}", options.flag_prefix(), preprocess_pattern(&src_text));
    let regex = ByteRegexBuilder::new(&pattern)
        .unicode(encoding == EncodingRef::UTF_8)
        .build()
        .ok()?;
    Some(FastMatcher { regex })
}

//------------------------------------------------------------

///
/// Record of a successful match.
///
/// Owns a private frozen copy of the subject, so later mutation of the
/// subject by the caller can not corrupt group extraction.
///
#[derive(Debug, Clone)]
pub struct MatchDataInfo {
    pub regexp: RegexpInfo,
    pub subject: RString,
    /// Group-start byte offsets; -1 marks an unmatched group.
    pub starts: Vec<i32>,
    pub ends: Vec<i32>,
}

impl MatchDataInfo {
    pub fn new(regexp: RegexpInfo, subject: &RString, starts: Vec<i32>, ends: Vec<i32>) -> Self {
        MatchDataInfo {
            regexp,
            subject: subject.frozen_dup(),
            starts,
            ends,
        }
    }

    pub fn group_count(&self) -> usize {
        self.starts.len()
    }

    /// Byte span of group `i`, or None when it did not participate.
    pub fn group(&self, i: usize) -> Option<(usize, usize)> {
        let start = *self.starts.get(i)?;
        if start < 0 {
            return None;
        }
        Some((start as usize, self.ends[i] as usize))
    }

    pub fn group_bytes(&self, i: usize) -> Option<&[u8]> {
        let (start, end) = self.group(i)?;
        Some(&self.subject.as_bytes()[start..end])
    }

    pub fn group_value(&self, i: usize) -> Value {
        match self.group_bytes(i) {
            Some(bytes) => Value::bytes(bytes.to_vec(), self.subject.encoding()),
            None => Value::nil(),
        }
    }

    pub fn named_group_value(&self, name: &str) -> Value {
        match self.regexp.named_group(name) {
            Some(i) => self.group_value(i),
            None => Value::nil(),
        }
    }

    /// Shift every participating group by `start_pos`. Used when a match
    /// ran over a trailing slice of the true subject.
    pub fn fixup_positions(&mut self, start_pos: i32) {
        for (s, e) in self.starts.iter_mut().zip(self.ends.iter_mut()) {
            if *s >= 0 {
                *s += start_pos;
                *e += start_pos;
            }
        }
    }
}

//------------------------------------------------------------

// Matching.

/// A subject decoded for the backtracking engine, with maps between
/// decoded and original byte offsets for the widening case.
struct DecodedSubject {
    text: String,
    /// Original byte offset per decoded byte offset, when widened.
    widened: bool,
}

impl DecodedSubject {
    fn decode(bytes: &[u8], encoding: EncodingRef) -> Result<DecodedSubject, RubyError> {
        match encoding {
            EncodingRef::ISO_8859_1 | EncodingRef::ASCII_8BIT => Ok(DecodedSubject {
                text: bytes.iter().map(|b| *b as char).collect(),
                widened: true,
            }),
            _ => match std::str::from_utf8(bytes) {
                Ok(s) => Ok(DecodedSubject {
                    text: s.to_string(),
                    widened: false,
                }),
                Err(_) => Err(RubyError::encoding_invalid_byte_sequence(encoding)),
            },
        }
    }

    /// Decoded byte offset for an original byte offset.
    fn to_decoded(&self, orig: usize) -> usize {
        if !self.widened {
            return orig;
        }
        self.text
            .char_indices()
            .nth(orig)
            .map(|(off, _)| off)
            .unwrap_or(self.text.len())
    }

    /// Original byte offset for a decoded byte offset.
    fn to_original(&self, decoded: usize) -> usize {
        if !self.widened {
            return decoded;
        }
        self.text[..decoded].chars().count()
    }
}

impl RegexpInfo {
    /// The backtracking path of `match_in_region`.
    ///
    /// `from`/`to` delimit the search region in subject byte offsets;
    /// `to < from` requests a backward search. `at_start` anchors the
    /// match at the search position. `start_pos` is where the matcher
    /// considers the subject to begin.
    pub fn match_in_region_slow(
        &self,
        vm: &mut VM,
        subject: Value,
        from: i64,
        to: i64,
        at_start: bool,
        start_pos: i64,
    ) -> VMResult {
        let rs = subject.expect_string("Subject")?.clone();
        self.instrument_match(vm);
        let chosen = match self.select_encoding(rs.rope())? {
            Some(enc) => enc,
            None => return Ok(Value::nil()),
        };
        let matcher = self.slow_matcher_for(vm, chosen)?;
        let bytes = rs.as_bytes();
        let len = bytes.len() as i64;
        if from < 0 || from > len || start_pos < 0 || start_pos > len {
            return Ok(Value::nil());
        }
        let backward = to < from;
        let clip = if backward { len } else { to.min(len) };

        let region = &bytes[start_pos as usize..clip as usize];
        let decoded = DecodedSubject::decode(region, chosen)?;
        let search_from = decoded.to_decoded((from - start_pos).max(0) as usize);

        let caps = if backward {
            let limit = decoded.to_decoded((to - start_pos).max(0) as usize);
            self.search_backward(vm, &matcher, &decoded.text, search_from, limit)?
        } else {
            self.search_forward(&matcher, &decoded.text, search_from, at_start)?
        };

        match caps {
            Some(caps) => {
                let mut starts = vec![];
                let mut ends = vec![];
                for i in 0..caps.len() {
                    match caps.get(i) {
                        Some(m) => {
                            starts.push(
                                (decoded.to_original(m.start()) as i64 + start_pos) as i32,
                            );
                            ends.push((decoded.to_original(m.end()) as i64 + start_pos) as i32);
                        }
                        None => {
                            starts.push(-1);
                            ends.push(-1);
                        }
                    }
                }
                let md = MatchDataInfo::new(self.clone(), &rs, starts, ends);
                Ok(Value::matchdata(md))
            }
            None => Ok(Value::nil()),
        }
    }

    fn search_forward<'t>(
        &self,
        matcher: &SlowMatcher,
        text: &'t str,
        from: usize,
        at_start: bool,
    ) -> Result<Option<fancy_regex::Captures<'t>>, RubyError> {
        if from > text.len() || !text.is_char_boundary(from) {
            return Ok(None);
        }
        let caps = matcher
            .regex
            .captures_from_pos(text, from)
            .map_err(|err| RubyError::internal(format!("Capture failed. {:?}", err)))?;
        match caps {
            Some(caps) => {
                if at_start && caps.get(0).unwrap().start() != from {
                    return Ok(None);
                }
                Ok(Some(caps))
            }
            None => Ok(None),
        }
    }

    /// Find the latest match whose start lies in `limit..=from`.
    fn search_backward<'t>(
        &self,
        vm: &mut VM,
        matcher: &SlowMatcher,
        text: &'t str,
        from: usize,
        limit: usize,
    ) -> Result<Option<fancy_regex::Captures<'t>>, RubyError> {
        let mut pos = from.min(text.len());
        loop {
            vm.check_interrupt()?;
            if text.is_char_boundary(pos) {
                let caps = matcher
                    .regex
                    .captures_from_pos(text, pos)
                    .map_err(|err| RubyError::internal(format!("Capture failed. {:?}", err)))?;
                if let Some(caps) = caps {
                    if caps.get(0).unwrap().start() == pos {
                        return Ok(Some(caps));
                    }
                }
            }
            if pos <= limit {
                return Ok(None);
            }
            pos -= 1;
        }
    }

    /// Match against the specified region of `subject`, using the fastest
    /// matcher whose contract covers the request.
    pub fn match_in_region(
        &self,
        vm: &mut VM,
        subject: Value,
        from: i64,
        to: i64,
        at_start: bool,
        start_pos: i64,
    ) -> VMResult {
        let rs = subject.expect_string("Subject")?.clone();
        let byte_len = rs.byte_len() as i64;

        if !vm.globals.options.regexp_use_fast_path {
            return self.match_in_region_slow(vm, subject, from, to, at_start, start_pos);
        }
        // The fast path's contract covers exactly the full-tail region
        // shape.
        if to < from || to != byte_len || start_pos != 0 || from < 0 {
            return self.fallback(vm, subject, from, to, at_start, start_pos);
        }
        let chosen = match self.select_encoding(rs.rope())? {
            Some(enc) => enc,
            None => return Ok(Value::nil()),
        };
        let fast = match self.fast_matcher_for(chosen) {
            Some(fast) => fast,
            None => return self.fallback(vm, subject, from, to, at_start, start_pos),
        };
        self.instrument_match(vm);

        let result = self.run_fast(&fast, &rs, from as usize, at_start);

        if vm.globals.options.regexp_compare_engines {
            self.compare_engines(vm, subject, from, to, at_start, start_pos, &result);
        }

        match result {
            Some((starts, ends)) => {
                let md = MatchDataInfo::new(self.clone(), &rs, starts, ends);
                Ok(Value::matchdata(md))
            }
            None => Ok(Value::nil()),
        }
    }

    fn run_fast(
        &self,
        fast: &FastMatcher,
        rs: &RString,
        from: usize,
        at_start: bool,
    ) -> Option<(Vec<i32>, Vec<i32>)> {
        let bytes = rs.as_bytes();
        if from > bytes.len() {
            return None;
        }
        let mut locs = fast.regex.capture_locations();
        let whole = fast.regex.captures_read_at(&mut locs, bytes, from)?;
        if at_start && whole.start() != from {
            return None;
        }
        let mut starts = vec![];
        let mut ends = vec![];
        for i in 0..locs.len() {
            match locs.get(i) {
                Some((s, e)) => {
                    starts.push(s as i32);
                    ends.push(e as i32);
                }
                None => {
                    starts.push(-1);
                    ends.push(-1);
                }
            }
        }
        Some((starts, ends))
    }

    fn fallback(
        &self,
        vm: &mut VM,
        subject: Value,
        from: i64,
        to: i64,
        at_start: bool,
        start_pos: i64,
    ) -> VMResult {
        vm.globals.regexp_stats.fallbacks += 1;
        if vm.globals.options.regexp_warn_fallback {
            eprintln!(
                "regexp: falling back to the backtracking engine for /{}/ (from:{} to:{} at_start:{} start:{}).",
                self.as_str(),
                from,
                to,
                at_start,
                start_pos
            );
        }
        self.match_in_region_slow(vm, subject, from, to, at_start, start_pos)
    }

    /// Audit mode: run the backtracking engine over the same region and
    /// insist on identical group boundaries.
    fn compare_engines(
        &self,
        vm: &mut VM,
        subject: Value,
        from: i64,
        to: i64,
        at_start: bool,
        start_pos: i64,
        fast_result: &Option<(Vec<i32>, Vec<i32>)>,
    ) {
        let slow = self
            .match_in_region_slow(vm, subject, from, to, at_start, start_pos)
            .expect("compare-engines: the slow path failed.");
        match (fast_result, slow.as_matchdata()) {
            (Some((starts, ends)), Some(md)) => {
                assert_eq!(
                    (starts, ends),
                    (&md.starts, &md.ends),
                    "compare-engines: group boundaries diverged for /{}/",
                    self.as_str()
                );
            }
            (None, None) => {}
            (fast, slow) => panic!(
                "compare-engines: engines disagree for /{}/ (fast:{:?} slow:{:?})",
                self.as_str(),
                fast.is_some(),
                slow.is_some()
            ),
        }
    }

    fn instrument_match(&self, vm: &mut VM) {
        if vm.globals.options.regexp_instrument_match {
            let key = cache_key(&self.0.source, self.0.effective, self.0.options);
            *vm.globals.regexp_stats.matched.entry(key).or_insert(0) += 1;
        }
    }
}

// String-level helpers over the primary matcher, for the bundled library.
impl RegexpInfo {
    /// Replace the leftmost match in `given` with `replace`. `\0`..`\9`
    /// in the replacement refer to groups.
    pub fn replace_once(&self, given: &str, replace: &str) -> Result<(String, bool), RubyError> {
        match self
            .0
            .primary
            .regex
            .captures(given)
            .map_err(|err| RubyError::internal(format!("Capture failed. {:?}", err)))?
        {
            None => Ok((given.to_string(), false)),
            Some(captures) => {
                let m = captures.get(0).unwrap();
                let mut rep = "".to_string();
                let mut escape = false;
                for ch in replace.chars() {
                    if escape {
                        match ch {
                            '0'..='9' => {
                                let i = ch as usize - '0' as usize;
                                if let Some(m) = captures.get(i) {
                                    rep += m.as_str();
                                }
                            }
                            _ => rep.push(ch),
                        };
                        escape = false;
                    } else if ch == '\\' {
                        escape = true;
                    } else {
                        rep.push(ch);
                    }
                }
                let mut res = given.to_string();
                res.replace_range(m.start()..m.end(), &rep);
                Ok((res, true))
            }
        }
    }

    /// Replace all non-overlapping matches in `given` with `replace`.
    pub fn replace_repeat(
        &self,
        vm: &mut VM,
        given: &str,
        replace: &str,
    ) -> Result<(String, bool), RubyError> {
        let mut range = vec![];
        let mut i = 0;
        loop {
            vm.check_interrupt()?;
            if i > given.len() {
                break;
            }
            match self
                .0
                .primary
                .regex
                .captures_from_pos(given, i)
                .map_err(|err| RubyError::internal(format!("Capture failed. {:?}", err)))?
            {
                None => break,
                Some(captures) => {
                    let m = captures.get(0).unwrap();
                    // A zero-width match must not loop forever.
                    i = if m.end() == m.start() {
                        m.end() + 1
                    } else {
                        m.end()
                    };
                    range.push((m.start(), m.end()));
                }
            };
        }
        let mut res = given.to_string();
        for (start, end) in range.iter().rev() {
            res.replace_range(start..end, replace);
        }
        Ok((res, !range.is_empty()))
    }

    /// Replace all non-overlapping matches in `given` with the result of
    /// `f` applied to the matched text.
    pub fn replace_repeat_with(
        &self,
        vm: &mut VM,
        given: &str,
        mut f: impl FnMut(&mut VM, &str) -> Result<String, RubyError>,
    ) -> Result<(String, bool), RubyError> {
        let mut ranges = vec![];
        let mut i = 0;
        loop {
            vm.check_interrupt()?;
            if i > given.len() {
                break;
            }
            match self
                .0
                .primary
                .regex
                .captures_from_pos(given, i)
                .map_err(|err| RubyError::internal(format!("Capture failed. {:?}", err)))?
            {
                None => break,
                Some(captures) => {
                    let m = captures.get(0).unwrap();
                    i = if m.end() == m.start() {
                        m.end() + 1
                    } else {
                        m.end()
                    };
                    let replacement = f(vm, m.as_str())?;
                    ranges.push((m.start(), m.end(), replacement));
                }
            };
        }
        let mut res = given.to_string();
        for (start, end, replacement) in ranges.iter().rev() {
            res.replace_range(start..end, replacement);
        }
        Ok((res, !ranges.is_empty()))
    }

    /// All matches, scan-style: whole matches without groups, group
    /// tuples otherwise.
    pub fn find_all(&self, vm: &mut VM, given: &str) -> Result<Vec<Value>, RubyError> {
        let mut ary = vec![];
        let mut idx = 0;
        loop {
            vm.check_interrupt()?;
            if idx > given.len() {
                break;
            }
            match self
                .0
                .primary
                .regex
                .captures_from_pos(given, idx)
                .map_err(|err| RubyError::internal(format!("Capture failed. {:?}", err)))?
            {
                None => break,
                Some(captures) => {
                    let m = captures.get(0).unwrap();
                    idx = if m.end() == m.start() {
                        m.end() + 1
                    } else {
                        m.end()
                    };
                    match captures.len() {
                        1 => ary.push(Value::string(m.as_str())),
                        len => {
                            let mut vec = vec![];
                            for i in 1..len {
                                match captures.get(i) {
                                    Some(m) => vec.push(Value::string(m.as_str())),
                                    None => vec.push(Value::nil()),
                                }
                            }
                            ary.push(Value::array_from(vec));
                        }
                    }
                }
            };
        }
        Ok(ary)
    }
}

//------------------------------------------------------------

/// Quote `s` so every metacharacter matches literally.
pub fn quote(s: &str) -> String {
    regex::escape(s)
}

/// Build a regexp source alternating over `parts`, quoting plain
/// strings.
pub fn union_source(parts: &[Value]) -> Result<String, RubyError> {
    let mut source = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i != 0 {
            source.push('|');
        }
        if let Some(re) = part.as_regexp() {
            source.push_str(&format!("(?:{})", re.as_str()));
        } else if let Some(rs) = part.as_rstring() {
            source.push_str(&quote(&rs.to_s()));
        } else {
            return Err(RubyError::wrong_type("Union element", "Regexp or String", *part));
        }
    }
    Ok(source)
}

/// Compose a union regexp from `parts`.
pub fn union(vm: &mut VM, parts: &[Value]) -> VMResult {
    let source = union_source(parts)?;
    let re = RegexpInfo::from_string(vm, &source)?;
    Ok(Value::regexp(re))
}

///
/// Call-site cache for `Regexp.union` over a literal argument list.
///
/// A hit requires every argument to be identical to the cached call, so
/// a hot literal union compiles once.
///
#[derive(Debug, Default)]
pub struct UnionSite {
    cached_args: Vec<u64>,
    cached: Option<Value>,
}

impl UnionSite {
    pub fn new() -> Self {
        UnionSite::default()
    }

    pub fn call(&mut self, vm: &mut VM, parts: &[Value]) -> VMResult {
        if let Some(cached) = self.cached {
            if self.cached_args.len() == parts.len()
                && self
                    .cached_args
                    .iter()
                    .zip(parts.iter())
                    .all(|(id, v)| *id == v.id())
            {
                return Ok(cached);
            }
        }
        let result = union(vm, parts)?;
        self.cached_args = parts.iter().map(|v| v.id()).collect();
        self.cached = Some(result);
        Ok(result)
    }
}

///
/// Per-(source, encoding, flags) counters, tallied when the instrument
/// options are set. Keys match the compile cache so both correlate.
///
#[derive(Debug, Default)]
pub struct RegexpStats {
    pub compiled: FxHashMap<RegexpCacheKey, usize>,
    pub matched: FxHashMap<RegexpCacheKey, usize>,
    pub fallbacks: usize,
}
