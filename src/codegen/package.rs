//! Compilation-unit driver
//!
//! `Translator` owns all cross-declaration state: the type-id registry, the
//! unique-name counter, the per-unit tuple typedef set and the init
//! collector. `translate_package` walks a package's declarations in source
//! order, topologically sorts the resulting descriptors by same-unit
//! dependency, and assembles one header, one source file and one import
//! manifest.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::Path;

use super::cdd::{Cdd, DeclKind, RefKey};
use super::mangle::upath;
use super::typeids::TypeIds;
use crate::ast::Package;
use crate::errors::Result;

/// Target and emission knobs
#[derive(Debug, Clone)]
pub struct Config {
    /// Pointer size in bytes; bounds what fits in an interface
    pub ptr_size: u64,
    /// Function bodies at or below this complexity inline into the header
    pub inline_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ptr_size: 4,
            inline_threshold: 12,
        }
    }
}

/// One cross-unit reference in the import manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub pkg: String,
    pub name: String,
    /// The definition is needed, not just the declaration
    pub direct: bool,
}

/// The translated form of one package
#[derive(Debug)]
pub struct PackageOutput {
    /// Import path
    pub path: String,
    /// Package name; the file stem of the emitted pair
    pub name: String,
    pub header: String,
    pub source: String,
    pub imports: Vec<ImportEntry>,
}

impl PackageOutput {
    /// The manifest serialisation: one `path name direct|decl` line per entry
    pub fn manifest(&self) -> String {
        let mut out = String::new();
        for e in &self.imports {
            out.push_str(&format!(
                "{} {} {}\n",
                e.pkg,
                e.name,
                if e.direct { "direct" } else { "decl" }
            ));
        }
        out
    }

    /// Write `«root»/«path»/«name».{h,c,imports}`
    pub fn write_to(&self, root: &Path) -> Result<()> {
        let dir = root.join(&self.path);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(format!("{}.h", self.name)), &self.header)?;
        fs::write(dir.join(format!("{}.c", self.name)), &self.source)?;
        fs::write(dir.join(format!("{}.imports", self.name)), self.manifest())?;
        Ok(())
    }
}

/// The translator: one instance drives any number of packages in sequence
#[derive(Debug)]
pub struct Translator {
    cfg: Config,
    cur_pkg: String,
    next_id: u32,
    type_ids: TypeIds,
    /// Fresh-name memoisation keyed by object identity
    pub(crate) uniq_names: HashMap<usize, String>,
    /// Tuple typedefs already placed somewhere in the current unit
    unit_tuples: BTreeSet<String>,
    /// Initialiser statements collected for the unit init function
    unit_inits: Vec<String>,
    /// Mangled user init functions, in declaration order
    unit_init_funcs: Vec<String>,
}

impl Translator {
    pub fn new(cfg: Config, pkg_path: &str) -> Self {
        Translator {
            cfg,
            cur_pkg: pkg_path.to_string(),
            next_id: 0,
            type_ids: TypeIds::new(),
            uniq_names: HashMap::new(),
            unit_tuples: BTreeSet::new(),
            unit_inits: Vec::new(),
            unit_init_funcs: Vec::new(),
        }
    }

    pub(crate) fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub(crate) fn cur_pkg(&self) -> &str {
        &self.cur_pkg
    }

    pub(crate) fn unique_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Register a tuple typedef name; true when it was not yet placed in
    /// this unit
    pub(crate) fn note_tuple(&mut self, name: &str) -> bool {
        self.unit_tuples.insert(name.to_string())
    }

    pub(crate) fn type_id(&mut self, base: &str, dims: &[String]) -> u64 {
        self.type_ids.id(base, dims)
    }

    pub(crate) fn add_unit_init(&mut self, stmt: String) {
        self.unit_inits.push(stmt);
    }

    pub(crate) fn add_unit_init_func(&mut self, mangled: String) {
        self.unit_init_funcs.push(mangled);
    }

    /// Translate one package into its header, source and manifest
    pub fn translate_package(&mut self, pkg: &Package) -> Result<PackageOutput> {
        self.cur_pkg = pkg.path.clone();
        self.unit_tuples.clear();
        self.unit_inits.clear();
        self.unit_init_funcs.clear();

        let mut cdds = Vec::new();
        for d in &pkg.decls {
            cdds.extend(self.decl(d, 0)?);
        }
        cdds.push(self.init_cdd());

        let order = topo_order(&cdds);

        // Union of cross-unit references
        let mut refs: BTreeMap<RefKey, bool> = BTreeMap::new();
        for c in &cdds {
            for (k, d) in &c.refs {
                let e = refs.entry(k.clone()).or_insert(false);
                *e = *e || *d;
            }
        }
        let imports: Vec<ImportEntry> = refs
            .iter()
            .map(|(k, &d)| ImportEntry {
                pkg: k.pkg.clone(),
                name: k.name.clone(),
                direct: d,
            })
            .collect();

        let up = upath(&pkg.path);
        let guard = format!("{}_H", up.to_uppercase());

        let mut header = String::new();
        header.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
        header.push_str("#include \"mica.h\"\n");
        let mut included = BTreeSet::new();
        for e in &imports {
            if included.insert(e.pkg.clone()) {
                let stem = e.pkg.rsplit('/').next().unwrap_or(&e.pkg);
                header.push_str(&format!("#include \"{}/{}.h\"\n", e.pkg, stem));
            }
        }
        header.push('\n');

        // Type names first so mutually referential structs resolve
        for &i in &order {
            if cdds[i].kind == DeclKind::Type {
                header.push_str(&cdds[i].decl);
            }
        }
        header.push('\n');
        for &i in &order {
            let c = &cdds[i];
            match c.kind {
                DeclKind::Type => header.push_str(&c.def),
                _ => {
                    header.push_str(&c.decl);
                    if c.def_in_header {
                        header.push_str(&c.def);
                    }
                }
            }
        }
        header.push_str(&format!("\n#endif /* {} */\n", guard));

        let mut source = String::new();
        source.push_str(&format!("#include \"{}/{}.h\"\n\n", pkg.path, pkg.name));
        for &i in &order {
            let c = &cdds[i];
            if c.kind != DeclKind::Type && !c.def_in_header {
                source.push_str(&c.def);
            }
        }

        Ok(PackageOutput {
            path: pkg.path.clone(),
            name: pkg.name.clone(),
            header,
            source,
            imports,
        })
    }

    /// The per-unit init function: variable initialisers first, then user
    /// init functions in declaration order
    fn init_cdd(&mut self) -> Cdd {
        let up = upath(&self.cur_pkg);
        let name = format!("{}$init", up);
        let mut cdd = Cdd::new(name.clone(), DeclKind::Func, 0);
        cdd.decl = format!("void {}(void);\n", name);
        let mut def = format!("void {}(void) {{\n", name);
        for s in &self.unit_inits {
            def.push_str(s);
        }
        for f in &self.unit_init_funcs {
            def.push_str(&format!("\t{}();\n", f));
            cdd.local_deps.insert(f.clone());
        }
        def.push_str("}\n");
        cdd.def = def;
        cdd
    }
}

/// Stable topological order over same-unit dependencies: a declaration
/// follows everything it mentions, source order breaking ties. Cycles (legal
/// through pointers) fall back to source order.
fn topo_order(cdds: &[Cdd]) -> Vec<usize> {
    let by_name: HashMap<&str, usize> = cdds
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; cdds.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); cdds.len()];
    for (i, c) in cdds.iter().enumerate() {
        for dep in &c.local_deps {
            if let Some(&j) = by_name.get(dep.as_str()) {
                if j != i {
                    indegree[i] += 1;
                    dependents[j].push(i);
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..cdds.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(cdds.len());
    let mut seen = vec![false; cdds.len()];
    while let Some(i) = queue.pop_front() {
        if seen[i] {
            continue;
        }
        seen[i] = true;
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] = indegree[d].saturating_sub(1);
            if indegree[d] == 0 && !seen[d] {
                queue.push_back(d);
            }
        }
    }
    // Anything still unplaced sits on a cycle
    for i in 0..cdds.len() {
        if !seen[i] {
            order.push(i);
        }
    }
    order
}
