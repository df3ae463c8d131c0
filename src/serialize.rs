//! Reading and writing genomes and populations. Two encodings: the
//! line-oriented plain-text records (`genomestart ... genomeend`), and the
//! structured JSON document (a strict subset of YAML) that also carries
//! module genes. Reading back anything written here is a fixed point.

use crate::{
    activation::Activation,
    config::Options,
    error::{CancelToken, Error, Result},
    genome::{Gene, Genome, Node, NodeRole, Trait, NUM_TRAIT_PARAMS},
    innovation::InnovationStore,
    organism::Organism,
    population::Population,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::Path,
    str::FromStr,
};

/// Write one genome as plain-text records. Module genes have no plain-text
/// representation; modular genomes must use the structured encoding.
pub fn write_genome<W: Write>(w: &mut W, genome: &Genome) -> Result<()> {
    if !genome.control_genes.is_empty() {
        return Err(Error::UnsupportedEncoding(
            "plain text cannot carry module genes".into(),
        ));
    }

    writeln!(w, "genomestart {}", genome.id)?;
    for t in &genome.traits {
        write!(w, "trait {}", t.id)?;
        for p in &t.params {
            write!(w, " {p}")?;
        }
        writeln!(w)?;
    }
    for n in &genome.nodes {
        writeln!(
            w,
            "node {} {} {} {} {}",
            n.id,
            n.trait_id,
            n.role.node_type().code(),
            n.role.code(),
            n.activation.name(),
        )?;
    }
    for g in &genome.genes {
        writeln!(
            w,
            "gene {} {} {} {} {} {} {} {}",
            g.trait_id, g.from, g.to, g.weight, g.recurrent, g.innovation, g.mutation_num, g.enabled,
        )?;
    }
    writeln!(w, "genomeend {}", genome.id)?;
    Ok(())
}

/// Read one plain-text genome. Comment lines (`/* ... */`) are surfaced as
/// log output. Verifies the start and end markers carry the same id.
pub fn read_genome<R: BufRead>(r: R) -> Result<Genome> {
    let mut lines = r.lines();
    read_genome_lines(&mut lines)?.ok_or_else(|| Error::malformed(0, "no genome record found"))
}

fn read_genome_lines<I: Iterator<Item = std::io::Result<String>>>(
    lines: &mut I,
) -> Result<Option<Genome>> {
    let mut genome: Option<Genome> = None;

    for line in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("/*") {
            info!("{}", trimmed.trim_start_matches("/*").trim_end_matches("*/").trim());
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let tag = tokens.next().unwrap_or_default();
        let current_id = genome.as_ref().map(|g| g.id).unwrap_or(0);

        match tag {
            "genomestart" => {
                let id = parse_token(&mut tokens, current_id, "genome id")?;
                genome = Some(Genome::new(id));
            }
            "trait" => {
                let genome = expect_genome(&mut genome)?;
                let id = parse_token(&mut tokens, genome.id, "trait id")?;
                let mut params = [0.; NUM_TRAIT_PARAMS];
                for p in params.iter_mut() {
                    *p = parse_token(&mut tokens, genome.id, "trait param")?;
                }
                genome.traits.push(Trait::with_params(id, params));
            }
            "node" => {
                let genome = expect_genome(&mut genome)?;
                let id = parse_token(&mut tokens, genome.id, "node id")?;
                let trait_id = parse_token(&mut tokens, genome.id, "node trait")?;
                let _node_type: u8 = parse_token(&mut tokens, genome.id, "node type")?;
                let role_code: u8 = parse_token(&mut tokens, genome.id, "neuron type")?;
                let role = NodeRole::from_code(role_code)
                    .ok_or_else(|| Error::malformed(genome.id, format!("neuron type {role_code}")))?;
                let activation = match tokens.next() {
                    Some(name) => Activation::from_name(name)?,
                    None => Activation::default(),
                };
                genome.nodes.push(Node::with_trait(id, role, activation, trait_id));
            }
            "gene" => {
                let genome = expect_genome(&mut genome)?;
                let trait_id = parse_token(&mut tokens, genome.id, "gene trait")?;
                let from = parse_token(&mut tokens, genome.id, "gene source")?;
                let to = parse_token(&mut tokens, genome.id, "gene target")?;
                let weight = parse_token(&mut tokens, genome.id, "gene weight")?;
                let recurrent = parse_bool(&mut tokens, genome.id, "gene recurrence")?;
                let innovation = parse_token(&mut tokens, genome.id, "gene innovation")?;
                let mutation_num = parse_token(&mut tokens, genome.id, "gene mutation num")?;
                let enabled = parse_bool(&mut tokens, genome.id, "gene enabled")?;

                let mut gene = Gene::new(from, to, weight, recurrent, innovation);
                gene.trait_id = trait_id;
                gene.mutation_num = mutation_num;
                gene.enabled = enabled;
                genome.genes.push(gene);
            }
            "genomeend" => {
                let Some(finished) = genome.take() else {
                    return Err(Error::malformed(0, "record before genomestart"));
                };
                let end_id: usize = parse_token(&mut tokens, finished.id, "genome id")?;
                if end_id != finished.id {
                    return Err(Error::malformed(
                        finished.id,
                        format!("genomeend carries id {end_id}"),
                    ));
                }
                return Ok(Some(finished));
            }
            other => {
                return Err(Error::malformed(
                    current_id,
                    format!("unrecognized record {other}"),
                ));
            }
        }
    }

    match genome {
        Some(unterminated) => Err(Error::malformed(unterminated.id, "missing genomeend")),
        None => Ok(None),
    }
}

fn expect_genome(genome: &mut Option<Genome>) -> Result<&mut Genome> {
    genome
        .as_mut()
        .ok_or_else(|| Error::malformed(0, "record before genomestart"))
}

fn parse_token<'a, T: FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
    genome_id: usize,
    what: &str,
) -> Result<T> {
    let token = tokens
        .next()
        .ok_or_else(|| Error::malformed(genome_id, format!("missing {what}")))?;
    token
        .parse()
        .map_err(|_| Error::malformed(genome_id, format!("bad {what} `{token}`")))
}

fn parse_bool<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    genome_id: usize,
    what: &str,
) -> Result<bool> {
    let token = tokens
        .next()
        .ok_or_else(|| Error::malformed(genome_id, format!("missing {what}")))?;
    match token {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::malformed(genome_id, format!("bad {what} `{token}`"))),
    }
}

#[derive(Serialize)]
struct GenomeDocRef<'a> {
    genome: &'a Genome,
}

#[derive(Deserialize)]
struct GenomeDoc {
    genome: Genome,
}

/// Write the structured document `{ "genome": { ... } }`, modules included.
pub fn write_genome_structured<W: Write>(w: &mut W, genome: &Genome) -> Result<()> {
    serde_json::to_writer_pretty(w, &GenomeDocRef { genome })?;
    Ok(())
}

pub fn read_genome_structured<R: Read>(r: R) -> Result<Genome> {
    let doc: GenomeDoc = serde_json::from_reader(r)?;
    Ok(doc.genome)
}

/// Encoding dispatch by file extension: `.json` is the structured document,
/// `.txt`/`.ne`/`.genome` the plain-text records.
pub fn read_genome_file<P: AsRef<Path>>(path: P) -> Result<Genome> {
    let path = path.as_ref();
    match encoding_of(path)? {
        GenomeEncoding::Plain => read_genome(BufReader::new(File::open(path)?)),
        GenomeEncoding::Structured => read_genome_structured(File::open(path)?),
    }
}

pub fn write_genome_file<P: AsRef<Path>>(path: P, genome: &Genome) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    match encoding_of(path)? {
        GenomeEncoding::Plain => write_genome(&mut file, genome),
        GenomeEncoding::Structured => write_genome_structured(&mut file, genome),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenomeEncoding {
    Plain,
    Structured,
}

fn encoding_of(path: &Path) -> Result<GenomeEncoding> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "json" => Ok(GenomeEncoding::Structured),
        "txt" | "ne" | "genome" => Ok(GenomeEncoding::Plain),
        other => Err(Error::UnsupportedEncoding(other.to_string())),
    }
}

/// Write a whole population: a header comment and every genome in species
/// order.
pub fn write_population<W: Write>(
    w: &mut W,
    population: &Population,
    generation: usize,
) -> Result<()> {
    writeln!(w, "/* Population #{generation} */")?;
    for organism in population.organisms() {
        write_genome(w, &organism.genome)?;
    }
    Ok(())
}

/// Read a population back: organisms are rebuilt at generation 1 from the
/// concatenated genome records and speciated; the innovation and node id
/// counters resume one past the highest values on file.
pub fn read_population<R: BufRead>(r: R, opts: &Options) -> Result<Population> {
    opts.validate()?;

    let mut genomes = Vec::new();
    let mut lines = r.lines();
    while let Some(genome) = read_genome_lines(&mut lines)? {
        genomes.push(genome);
    }

    let next_innovation = genomes
        .iter()
        .map(Genome::last_gene_innovation)
        .max()
        .unwrap_or(0)
        + 1;
    let next_node = genomes.iter().map(Genome::last_node_id).max().unwrap_or(0) + 1;

    let mut organisms = Vec::with_capacity(genomes.len());
    for genome in genomes {
        genome.verify()?;
        organisms.push(Organism::new(0., genome, 1)?);
    }

    let mut population = Population::with_store(InnovationStore::new(next_innovation, next_node));
    population.speciate(organisms, opts, &CancelToken::new())?;
    Ok(population)
}
