extern crate corundum;
use corundum::*;

fn compile(vm: &mut VM, source: &str) -> RegexpInfo {
    RegexpInfo::from_string(vm, source).unwrap()
}

#[test]
fn lookbehind_falls_back_and_matches() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "(?<=abc)d");
    let subject = Value::string("abcd");

    // Lookbehind is outside the fast path's pattern support, so the
    // router falls back; the match must still be exact.
    let md = re.match_in_region(&mut vm, subject, 0, 4, false, 0).unwrap();
    let md = md.as_matchdata().unwrap();
    assert_eq!(Some((3, 4)), md.group(0));
    assert!(vm.globals.regexp_stats.fallbacks > 0);

    // Clipping the region before the `d` yields no match.
    let md = re.match_in_region(&mut vm, subject, 0, 3, false, 0).unwrap();
    assert!(md.is_nil());
}

#[test]
fn fast_and_slow_paths_agree() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "(a+)(b*)c");
    for subject in ["aabbc", "ac", "xxaacyy", "no match here", ""] {
        let s = Value::string(subject);
        let len = subject.len() as i64;
        let fast = re.match_in_region(&mut vm, s, 0, len, false, 0).unwrap();
        let slow = re
            .match_in_region_slow(&mut vm, s, 0, len, false, 0)
            .unwrap();
        match (fast.as_matchdata(), slow.as_matchdata()) {
            (Some(f), Some(s)) => {
                assert_eq!(f.starts, s.starts, "starts diverged on {:?}", subject);
                assert_eq!(f.ends, s.ends, "ends diverged on {:?}", subject);
            }
            (None, None) => {
                assert!(fast.is_nil() && slow.is_nil());
            }
            _ => panic!("engines disagree on {:?}", subject),
        }
    }
}

#[test]
fn compare_engines_audit_mode() {
    let mut options = RuntimeOptions::default();
    options.regexp_compare_engines = true;
    let mut vm = VM::with_options(options);
    let re = compile(&mut vm, "[a-z]+([0-9]*)");
    let subject = Value::string("abc123");
    let md = re.match_in_region(&mut vm, subject, 0, 6, false, 0).unwrap();
    assert_eq!(Some((0, 6)), md.as_matchdata().unwrap().group(0));
}

#[test]
fn region_shapes_route_to_the_slow_path() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "l+");
    let subject = Value::string("hello");

    let before = vm.globals.regexp_stats.fallbacks;
    // to != byte length.
    let md = re.match_in_region(&mut vm, subject, 0, 3, false, 0).unwrap();
    assert_eq!(Some((2, 3)), md.as_matchdata().unwrap().group(0));
    assert!(vm.globals.regexp_stats.fallbacks > before);

    // at_start anchors the match.
    let md = re.match_in_region(&mut vm, subject, 0, 5, true, 0).unwrap();
    assert!(md.is_nil());
    let md = re.match_in_region(&mut vm, subject, 2, 5, true, 0).unwrap();
    assert_eq!(Some((2, 4)), md.as_matchdata().unwrap().group(0));
}

#[test]
fn backward_search_finds_latest_start() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "ab");
    let subject = Value::string("ab ab ab");
    // to < from requests a backward search: the latest occurrence whose
    // start is within [to, from].
    let md = re.match_in_region(&mut vm, subject, 7, 0, false, 0).unwrap();
    assert_eq!(Some((6, 8)), md.as_matchdata().unwrap().group(0));
    let md = re.match_in_region(&mut vm, subject, 4, 0, false, 0).unwrap();
    assert_eq!(Some((3, 5)), md.as_matchdata().unwrap().group(0));
}

#[test]
fn matchdata_is_isolated_from_subject_mutation() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "b(c)d");
    let mut subject = Value::string("abcde");
    let md = re.match_in_region(&mut vm, subject, 0, 5, false, 0).unwrap();

    // Mutate the subject after the match.
    let suffix = RString::mutable_str("XXXX", EncodingRef::UTF_8);
    subject
        .as_mut_rstring()
        .unwrap()
        .append(&suffix)
        .unwrap();

    let md = md.as_matchdata().unwrap();
    assert_eq!(b"bcd", md.group_bytes(0).unwrap());
    assert_eq!(b"c", md.group_bytes(1).unwrap());
    assert!(md.subject.is_frozen());
}

#[test]
fn matchdata_fixup_shifts_positions() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "(x)(q?)");
    let tail = Value::string("abx");
    let md = re.match_in_region(&mut vm, tail, 0, 3, false, 0).unwrap();
    let md = matchdata_fixup_positions(md, 10).unwrap();
    let md = md.as_matchdata().unwrap();
    assert_eq!(Some((12, 13)), md.group(0));
    // Zero-width groups shift like any other.
    assert_eq!(Some((13, 13)), md.group(2));
}

#[test]
fn compile_cache_shares_compiled_bodies() {
    let mut vm = VM::new();
    let before = vm.globals.regexp_cache.len();
    let _a = compile(&mut vm, "cache_me[0-9]+");
    let after_first = vm.globals.regexp_cache.len();
    let _b = compile(&mut vm, "cache_me[0-9]+");
    let after_second = vm.globals.regexp_cache.len();
    assert_eq!(after_first, after_second);
    assert!(after_first > before);
}

#[test]
fn instrument_counters_share_the_cache_key() {
    let mut options = RuntimeOptions::default();
    options.regexp_instrument_creation = true;
    options.regexp_instrument_match = true;
    let mut vm = VM::with_options(options);
    let re = compile(&mut vm, "stat[s]?");
    let subject = Value::string("stats");
    for _ in 0..3 {
        re.match_in_region(&mut vm, subject, 0, 5, false, 0).unwrap();
    }
    let compiled: usize = vm.globals.regexp_stats.compiled.values().sum();
    let matched: usize = vm.globals.regexp_stats.matched.values().sum();
    assert_eq!(1, compiled);
    assert_eq!(3, matched);
    // Both tallies use the same key shape.
    let key = vm.globals.regexp_stats.compiled.keys().next().unwrap();
    assert!(vm.globals.regexp_stats.matched.contains_key(key));
}

#[test]
fn encoding_negotiation() {
    let mut vm = VM::new();

    // US-ASCII pattern over a 7-bit UTF-8 subject keeps the primary.
    let ascii_re = RegexpInfo::compile(
        &mut vm,
        Rope::from_str("a+", EncodingRef::US_ASCII),
        RegexpOptions::default(),
    )
    .unwrap();
    let subject = Rope::from_str("aaa", EncodingRef::UTF_8);
    assert_eq!(
        Some(EncodingRef::US_ASCII),
        ascii_re.select_encoding(&subject).unwrap()
    );

    // A fixed-encoding regexp over invalid bytes is a guaranteed
    // no-match.
    let fixed = RegexpInfo::compile(
        &mut vm,
        Rope::from_str("x", EncodingRef::UTF_8),
        RegexpOptions {
            fixed_encoding: true,
            ..RegexpOptions::default()
        },
    )
    .unwrap();
    let broken = Rope::from_bytes(vec![b'x', 0xff, 0xfe].into_boxed_slice(), EncodingRef::UTF_8);
    assert_eq!(None, fixed.select_encoding(&broken).unwrap());

    // Otherwise the subject's encoding wins and a variant is compiled.
    let latin = Rope::from_bytes(vec![0xe9, b'x'].into_boxed_slice(), EncodingRef::ISO_8859_1);
    let utf8_re = compile(&mut vm, "x");
    assert_eq!(
        Some(EncodingRef::ISO_8859_1),
        utf8_re.select_encoding(&latin).unwrap()
    );
}

#[test]
fn latin1_subject_offsets_stay_byte_accurate() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "x+");
    // 0xE9 ('é' in Latin-1) before the match; decoded text widens it,
    // but reported offsets must be subject byte offsets.
    let subject = Value::bytes(vec![0xe9, 0xe9, b'x', b'x'], EncodingRef::ISO_8859_1);
    let md = re.match_in_region(&mut vm, subject, 0, 4, false, 0).unwrap();
    let md = md.as_matchdata().unwrap();
    assert_eq!(Some((2, 4)), md.group(0));
}

#[test]
fn no_encoding_flag_forces_binary() {
    let mut vm = VM::new();
    let re = RegexpInfo::compile(
        &mut vm,
        Rope::from_str("n", EncodingRef::UTF_8),
        RegexpOptions {
            no_encoding: true,
            ..RegexpOptions::default()
        },
    )
    .unwrap();
    assert_eq!(EncodingRef::ASCII_8BIT, re.effective_encoding());
}

#[test]
fn union_call_site_cache_hits_on_identical_args() {
    let mut vm = VM::new();
    let a = Value::string("left");
    let b = Value::string("right|mid");
    let mut site = UnionSite::new();
    let first = site.call(&mut vm, &[a, b]).unwrap();
    let second = site.call(&mut vm, &[a, b]).unwrap();
    assert_eq!(first.id(), second.id());
    // A different argument list misses.
    let c = Value::string("left");
    let third = site.call(&mut vm, &[c, b]).unwrap();
    assert_ne!(first.id(), third.id());
}

#[test]
fn union_quotes_metacharacters() {
    let source = union_source(&[Value::string("a.b")]).unwrap();
    assert_eq!(r"a\.b", source);
}

#[test]
fn interrupt_cancels_long_scans() {
    let mut vm = VM::new();
    let re = compile(&mut vm, "a");
    vm.request_interrupt();
    let err = re.replace_repeat(&mut vm, "aaaa", "b").unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::Interrupt));
    vm.clear_interrupt();
    let (res, _) = re.replace_repeat(&mut vm, "aaaa", "b").unwrap();
    assert_eq!("bbbb", res);
}

#[test]
fn broken_pattern_is_a_regexp_error() {
    let mut vm = VM::new();
    let err = RegexpInfo::from_string(&mut vm, "+").unwrap_err();
    assert!(err.is_kind(RuntimeErrKind::Regexp));
}

#[test]
fn match_via_dispatch_scenario() {
    let mut vm = VM::new();
    // "The cat sat in the hat" =~ /[csh](..) [csh]\1 in/  => 4
    let re = compile(&mut vm, r"[csh](..) [csh]\1 in");
    let s = Value::string("The cat sat in the hat");
    let pos = vm.send1(IdentId::get_id("=~"), s, Value::regexp(re)).unwrap();
    assert_eq!(Value::integer(4), pos);
}

#[test]
fn symbol_identity_scenario() {
    let a = IdentId::intern(b"hello", EncodingRef::UTF_8);
    let b = IdentId::intern(b"hello", EncodingRef::UTF_8);
    assert_eq!(a, b);
    let c = IdentId::intern(b"hello", EncodingRef::US_ASCII);
    assert_ne!(a, c);
}
