//! Generated CAOS sources shared by the benchmarks.
//!
//! Sources are built in memory so the benches need no corpus on disk.

/// A C3 installer of roughly `lines` lines mixing arithmetic, strings,
/// conditionals and a subroutine.
pub fn mixed_script(lines: usize) -> String {
    let mut out = String::from("* generated benchmark script\nsetv va00 0\nsets va01 \"\"\n");
    let mut i = 0;
    while out.lines().count() < lines {
        out.push_str(&format!(
            "addv va00 {i}\ndoif va00 gt {limit}\n  setv va00 0\nelif va00 eq {i}\n  adds va01 \"x\"\nelse\n  mulv va00 2\nendi\ngsub step\n",
            i = i % 97,
            limit = 1000 + i
        ));
        i += 1;
    }
    out.push_str("stop\nsubr step\n  addv va02 1\nretn\n");
    out
}

/// The same kind of script in classic syntax.
pub fn classic_script(lines: usize) -> String {
    let mut out = String::from("setv var0 0\n");
    let mut i = 0;
    while out.lines().count() < lines {
        out.push_str(&format!("addv var0 {},doif var0 gt 500\n  setv var0 0\nendi\n", i % 50));
        i += 1;
    }
    out
}

/// A tight counting loop executed `iterations` times.
pub fn counting_loop(iterations: u32) -> String {
    format!("inst\nsetv va00 0\nreps {iterations}\n  addv va00 1\n  setv va01 va00\n  modv va01 7\nrepe\n")
}

/// An installer that creates `agents` agents, each with a timer script
/// that does a little arithmetic every tick.
pub fn timer_world(agents: u32) -> String {
    format!(
        "scrp 2 1 1 9\n  addv ov00 1\n  setv va00 ov00\n  mulv va00 3\n  modv va00 11\nendm\n\
         reps {agents}\n  new: simp 2 1 1 \"blnk\" 1 0 0\n  tick 1\nrepe\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_scripts_parse() {
        caos_compiler::parse("c3", &mixed_script(200)).unwrap();
        caos_compiler::parse("c2", &classic_script(200)).unwrap();
        caos_compiler::parse("c3", &counting_loop(10)).unwrap();
        let world = caos_compiler::parse("c3", &timer_world(4)).unwrap();
        assert_eq!(world.events.len(), 1);
    }

    #[test]
    fn counting_loop_counts() {
        let report = caos_runtime::run_script("c3", &format!("{}dbg: asrt va00 eq 100", counting_loop(100))).unwrap();
        assert!(report.passed());
    }
}
