//! Synthetic tracepoint definitions for stressing the UST code generator.
//!
//! Generates `random_tp_<i>.tp` template files, each declaring one
//! `TRACEPOINT_EVENT` with a random mix of field kinds, plus
//! `generated_tp.h` which includes their generated headers and defines
//! `GENERATED_TP` as a call to every tracepoint with literal arguments.
//! Output depends only on the count and the seed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub const DEFAULT_SEED: u64 = 10;
pub const HEADER_FILE: &str = "generated_tp.h";

const CONSONANTS: &[u8] = b"bcdfghjklmnpqrstvwxyz";
const VOWELS: &[u8] = b"aeiouy";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    IntegerInt,
    IntegerLong,
    FloatFloat,
    FloatDouble,
    String,
    SequenceChar,
    SequenceTextChar,
    ArrayChar,
    ArrayTextChar,
}

const FIELD_KINDS: [FieldKind; 9] = [
    FieldKind::IntegerInt,
    FieldKind::IntegerLong,
    FieldKind::FloatFloat,
    FieldKind::FloatDouble,
    FieldKind::String,
    FieldKind::SequenceChar,
    FieldKind::SequenceTextChar,
    FieldKind::ArrayChar,
    FieldKind::ArrayTextChar,
];

/// One generated tracepoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tracepoint {
    pub provider: String,
    pub name: String,
    /// `(c_type, arg_name)` in argument order.
    pub args: Vec<(String, String)>,
    pub fields: Vec<String>,
    /// Literal values passed by the `tracepoint()` call, matching `args`.
    pub values: Vec<String>,
}

impl Tracepoint {
    pub fn file_name(&self) -> String {
        format!("{}.tp", self.name)
    }

    /// The `.tp` template body.
    pub fn definition(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|(ty, name)| format!("{ty}, {name}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "TRACEPOINT_EVENT(\n\t{},\n\t{},\n\tTP_ARGS({args}),\n\tTP_FIELDS(\n\t\t{}\n\t)\n)",
            self.provider,
            self.name,
            self.fields.join("\n\t\t")
        )
    }

    pub fn call(&self) -> String {
        format!(
            "tracepoint({}, {}, {});",
            self.provider,
            self.name,
            self.values.join(", ")
        )
    }
}

fn pick(rng: &mut ChaCha8Rng, alphabet: &[u8]) -> char {
    alphabet[rng.gen_range(0..alphabet.len())] as char
}

fn clever_name(rng: &mut ChaCha8Rng) -> String {
    let syllables = rng.gen_range(2..=5);
    let mut name = String::with_capacity(syllables * 2);
    for _ in 0..syllables {
        name.push(pick(rng, CONSONANTS));
        name.push(pick(rng, VOWELS));
    }
    name
}

fn rand_int(rng: &mut ChaCha8Rng) -> i64 {
    rng.gen_range(-(i64::from(i32::MAX))..=i64::from(i32::MAX))
}

/// Per-tracepoint pool of candidate arguments and the fields built on them.
struct Builder<'r> {
    rng: &'r mut ChaCha8Rng,
    vars: BTreeMap<&'static str, (&'static str, String)>,
    used: BTreeSet<&'static str>,
    fields: Vec<String>,
}

impl<'r> Builder<'r> {
    fn new(rng: &'r mut ChaCha8Rng) -> Self {
        let len = rng.gen_range(2..=128);
        let text: String = (0..len).map(|_| pick(rng, LETTERS)).collect();

        let mut vars = BTreeMap::new();
        for name in ["tp_int_1", "tp_int_2"] {
            vars.insert(name, ("int", rand_int(rng).to_string()));
        }
        for name in ["tp_long_1", "tp_long_2"] {
            vars.insert(name, ("long", rand_int(rng).to_string()));
        }
        for name in ["tp_float_1", "tp_float_2"] {
            vars.insert(name, ("float", format!("{:?}", rng.gen::<f64>())));
        }
        for name in ["tp_double_1", "tp_double_2"] {
            vars.insert(name, ("double", format!("{:?}", rng.gen::<f64>())));
        }
        vars.insert("tp_charptr_1_size", ("size_t", text.len().to_string()));
        vars.insert("tp_charptr_1", ("char *", format!("\"{text}\"")));

        Self {
            rng,
            vars,
            used: BTreeSet::new(),
            fields: Vec::new(),
        }
    }

    fn field(&mut self, macro_name: &str, args: &[&str]) {
        self.fields.push(format!("{macro_name}({})", args.join(", ")));
    }

    fn numeric(&mut self, macro_name: &str, c_type: &'static str, vars: [&'static str; 2]) {
        let n = self.rng.gen_range(1..=2);
        let used = &vars[..n];
        self.used.extend(used);
        let name = clever_name(self.rng);
        self.field(macro_name, &[c_type, &name, &used.join(" + ")]);
    }

    fn text(&mut self, macro_name: &str, with_size_arg: bool, fixed_len: bool) {
        self.used.insert("tp_charptr_1");
        let name = clever_name(self.rng);
        let size = self.vars["tp_charptr_1_size"].1.clone();
        if with_size_arg {
            self.used.insert("tp_charptr_1_size");
            self.field(
                macro_name,
                &["char", &name, "tp_charptr_1", "size_t", "tp_charptr_1_size"],
            );
        } else if fixed_len {
            self.field(macro_name, &["char", &name, "tp_charptr_1", &size]);
        } else {
            self.field(macro_name, &[&name, "tp_charptr_1"]);
        }
    }

    fn add(&mut self, kind: FieldKind) {
        match kind {
            FieldKind::IntegerInt => self.numeric("ctf_integer", "int", ["tp_int_1", "tp_int_2"]),
            FieldKind::IntegerLong => {
                self.numeric("ctf_integer", "long", ["tp_long_1", "tp_long_2"])
            }
            FieldKind::FloatFloat => self.numeric("ctf_float", "float", ["tp_float_1", "tp_float_2"]),
            FieldKind::FloatDouble => {
                self.numeric("ctf_float", "double", ["tp_double_1", "tp_double_2"])
            }
            FieldKind::String => self.text("ctf_string", false, false),
            FieldKind::SequenceChar => self.text("ctf_sequence", true, false),
            FieldKind::SequenceTextChar => self.text("ctf_sequence_text", true, false),
            FieldKind::ArrayChar => self.text("ctf_array", false, true),
            FieldKind::ArrayTextChar => self.text("ctf_array_text", false, true),
        }
    }

    fn finish(self, index: usize) -> Tracepoint {
        let (args, values) = self
            .used
            .iter()
            .map(|name| {
                let (ty, value) = &self.vars[name];
                ((ty.to_string(), name.to_string()), value.clone())
            })
            .unzip();
        Tracepoint {
            provider: format!("benchmark_tracepoint_{index}"),
            name: format!("random_tp_{index}"),
            args,
            fields: self.fields,
            values,
        }
    }
}

/// Generate `count` tracepoints numbered from 1.
pub fn generate(count: usize, seed: u64) -> Vec<Tracepoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (1..=count)
        .map(|i| {
            let mut builder = Builder::new(&mut rng);
            let nfields = builder.rng.gen_range(1..=10);
            for _ in 0..nfields {
                let kind = FIELD_KINDS[builder.rng.gen_range(0..FIELD_KINDS.len())];
                builder.add(kind);
            }
            builder.finish(i)
        })
        .collect()
}

/// The aggregating header.
pub fn header(tracepoints: &[Tracepoint]) -> String {
    let includes = tracepoints
        .iter()
        .map(|tp| format!("#include \"{}.tp.h\"", tp.name))
        .collect::<Vec<_>>()
        .join("\n");
    let calls = tracepoints
        .iter()
        .map(Tracepoint::call)
        .collect::<Vec<_>>()
        .join("\\\n\t");
    format!("{includes}\n\n#define GENERATED_TP\\\n\t{calls}\n")
}

/// Write every `.tp` file and the header into `dir`.
pub fn write_all<P: AsRef<Path>>(dir: P, tracepoints: &[Tracepoint]) -> io::Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    for tp in tracepoints {
        fs::write(dir.join(tp.file_name()), tp.definition())?;
    }
    fs::write(dir.join(HEADER_FILE), header(tracepoints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn same_seed_same_output() {
        assert_eq!(generate(20, DEFAULT_SEED), generate(20, DEFAULT_SEED));
        assert_ne!(generate(20, DEFAULT_SEED), generate(20, DEFAULT_SEED + 1));
    }

    #[test]
    fn names_and_providers_are_numbered_from_one() {
        let tps = generate(3, DEFAULT_SEED);
        assert_eq!(tps[0].name, "random_tp_1");
        assert_eq!(tps[2].provider, "benchmark_tracepoint_3");
        assert_eq!(tps[1].file_name(), "random_tp_2.tp");
    }

    #[test]
    fn every_tracepoint_is_well_formed() {
        for tp in generate(200, DEFAULT_SEED) {
            assert!((1..=10).contains(&tp.fields.len()));
            assert!(!tp.args.is_empty());
            assert_eq!(tp.args.len(), tp.values.len());

            // Arguments are sorted by name and each one is referenced by a field.
            let names: Vec<&str> = tp.args.iter().map(|(_, n)| n.as_str()).collect();
            let mut sorted = names.clone();
            sorted.sort_unstable();
            assert_eq!(names, sorted);
            let body = tp.fields.join("\n");
            for name in &names {
                assert!(body.contains(name), "{name} unused in {}", tp.name);
            }

            let def = tp.definition();
            assert!(def.starts_with("TRACEPOINT_EVENT(\n\tbenchmark_tracepoint_"));
            assert!(def.ends_with("\n\t)\n)"));
        }
    }

    #[test]
    fn field_names_alternate_consonants_and_vowels() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let name = clever_name(&mut rng);
            assert!((4..=10).contains(&name.len()));
            for (i, b) in name.bytes().enumerate() {
                let alphabet = if i % 2 == 0 { CONSONANTS } else { VOWELS };
                assert!(alphabet.contains(&b));
            }
        }
    }

    #[test]
    fn string_argument_length_matches_size_literal() {
        for tp in generate(50, 3) {
            let find = |arg: &str| {
                tp.args
                    .iter()
                    .position(|(_, n)| n == arg)
                    .map(|i| tp.values[i].clone())
            };
            if let (Some(text), Some(size)) = (find("tp_charptr_1"), find("tp_charptr_1_size")) {
                assert_eq!(text.len() - 2, size.parse::<usize>().unwrap());
            }
        }
    }

    #[test]
    fn header_includes_and_calls_every_tracepoint() {
        let tps = generate(2, DEFAULT_SEED);
        let h = header(&tps);
        assert!(h.starts_with("#include \"random_tp_1.tp.h\"\n#include \"random_tp_2.tp.h\"\n\n"));
        assert!(h.contains("#define GENERATED_TP\\\n\ttracepoint(benchmark_tracepoint_1, random_tp_1, "));
        assert!(h.contains(";\\\n\ttracepoint(benchmark_tracepoint_2, random_tp_2, "));
        assert!(h.ends_with(");\n"));
    }

    #[test]
    fn writes_one_file_per_tracepoint_plus_header() {
        let dir = tempdir().unwrap();
        let tps = generate(4, DEFAULT_SEED);
        write_all(dir.path(), &tps).unwrap();

        let mut files: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                "generated_tp.h",
                "random_tp_1.tp",
                "random_tp_2.tp",
                "random_tp_3.tp",
                "random_tp_4.tp"
            ]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("random_tp_3.tp")).unwrap(),
            tps[2].definition()
        );
    }
}
