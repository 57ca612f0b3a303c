//! Lowers a parsed document to a generated module

use crate::ast::{Document, Node};
use crate::imports::ImportSpec;
use crate::module::{
	BODY_FUNCTION, GeneratedFunction, GeneratedModule, Instruction, Step, def_function_name,
};
use std::collections::BTreeMap;

/// Identity and settings of the module being generated
pub struct ModuleHeader<'a> {
	pub uri: &'a str,
	pub filename: Option<&'a str>,
	pub source: &'a str,
	pub imports: &'a [ImportSpec],
	pub default_filters: &'a [String],
}

#[derive(Default)]
struct FunctionBuilder {
	steps: Vec<(Instruction, Option<usize>)>,
}

impl FunctionBuilder {
	fn emit(&mut self, instruction: Instruction, line: Option<usize>) -> usize {
		self.steps.push((instruction, line));
		self.steps.len() - 1
	}

	fn here(&self) -> usize {
		self.steps.len()
	}

	fn patch(&mut self, index: usize, destination: usize) {
		match &mut self.steps[index].0 {
			Instruction::ForStart { exit, .. } => *exit = destination,
			Instruction::JumpUnless { target, .. } | Instruction::Jump(target) => {
				*target = destination
			}
			_ => {}
		}
	}

	fn nodes(&mut self, nodes: &[Node]) {
		for node in nodes {
			self.node(node);
		}
	}

	fn node(&mut self, node: &Node) {
		match node {
			Node::Text { text, line } => {
				self.emit(Instruction::Write(text.clone()), Some(*line));
			}
			Node::Expression {
				expr,
				filters,
				line,
			} => {
				self.emit(
					Instruction::Emit {
						expr: expr.clone(),
						filters: filters.clone(),
					},
					Some(*line),
				);
			}
			Node::For {
				targets,
				iter,
				body,
				line,
			} => {
				let start = self.emit(
					Instruction::ForStart {
						targets: targets.clone(),
						iter: iter.clone(),
						exit: 0,
					},
					Some(*line),
				);
				self.nodes(body);
				self.emit(Instruction::ForNext { start }, Some(*line));
				let end = self.here();
				self.patch(start, end);
			}
			Node::If {
				branches,
				otherwise,
				..
			} => {
				let mut exits = Vec::with_capacity(branches.len());
				for branch in branches {
					let test = self.emit(
						Instruction::JumpUnless {
							cond: branch.cond.clone(),
							target: 0,
						},
						Some(branch.line),
					);
					self.nodes(&branch.body);
					exits.push(self.emit(Instruction::Jump(0), None));
					let next = self.here();
					self.patch(test, next);
				}
				if let Some(nodes) = otherwise {
					self.nodes(nodes);
				}
				let end = self.here();
				for exit in exits {
					self.patch(exit, end);
				}
			}
		}
	}

	fn finish(mut self) -> Vec<(Instruction, Option<usize>)> {
		self.emit(Instruction::Return, None);
		self.steps
	}
}

#[derive(Default)]
struct Listing {
	lines: Vec<String>,
}

impl Listing {
	fn push(&mut self, line: impl Into<String>) -> usize {
		self.lines.push(line.into());
		self.lines.len()
	}
}

/// Generate the module for a parsed document
pub fn generate(document: &Document, header: &ModuleHeader<'_>) -> GeneratedModule {
	let mut listing = Listing::default();
	let mut line_map = BTreeMap::new();

	listing.push("# generated by reinhardt-mako-engine");
	listing.push(format!("# uri: {}", header.uri));
	listing.push(format!("# source: {}", header.filename.unwrap_or(header.uri)));
	listing.push("");
	let import_lines = header
		.imports
		.iter()
		.map(|spec| listing.push(spec.to_string()))
		.collect();
	listing.push("");

	let mut units = Vec::with_capacity(document.defs.len() + 1);
	let mut body = FunctionBuilder::default();
	body.nodes(&document.body);
	units.push((BODY_FUNCTION.to_string(), None, Vec::new(), 1, body.finish()));
	for def in &document.defs {
		let mut builder = FunctionBuilder::default();
		builder.nodes(&def.body);
		units.push((
			def_function_name(&def.name),
			Some(def.name.clone()),
			def.params.clone(),
			def.line,
			builder.finish(),
		));
	}

	let mut functions = Vec::with_capacity(units.len());
	for (name, def_name, params, source_line, raw_steps) in units {
		let signature: Vec<String> = params
			.iter()
			.map(|p| match &p.default {
				Some(default) => format!("{}={}", p.name, default),
				None => p.name.clone(),
			})
			.collect();
		let header_line = listing.push(format!("fn {}({}):", name, signature.join(", ")));
		line_map.insert(header_line, source_line);
		let steps = raw_steps
			.into_iter()
			.enumerate()
			.map(|(index, (instruction, line))| {
				let text = match line {
					Some(line) => format!("    {:>4}: {}  # line {}", index, instruction, line),
					None => format!("    {:>4}: {}", index, instruction),
				};
				let generated_line = listing.push(text);
				if let Some(line) = line {
					line_map.insert(generated_line, line);
				}
				Step {
					instruction,
					generated_line,
					source_line: line,
				}
			})
			.collect();
		listing.push("");
		functions.push(GeneratedFunction {
			name,
			def_name,
			params,
			header_line,
			source_line,
			steps,
		});
	}

	GeneratedModule {
		uri: header.uri.to_string(),
		filename: header.filename.map(str::to_string),
		module_file: format!("{}.gen", header.uri),
		source: header.source.to_string(),
		code: listing.lines.join("\n"),
		imports: header.imports.to_vec(),
		import_lines,
		default_filters: header.default_filters.to_vec(),
		functions,
		line_map,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parser::parse;
	use rstest::rstest;

	fn compile(source: &str) -> GeneratedModule {
		let document = parse(source, "t.html").unwrap();
		generate(
			&document,
			&ModuleHeader {
				uri: "t.html",
				filename: None,
				source,
				imports: &[],
				default_filters: &["str".to_string()],
			},
		)
	}

	#[rstest]
	fn test_loop_jump_targets() {
		// Arrange
		let source = "% for x in items:\n${x}\n% endfor\ndone";

		// Act
		let module = compile(source);

		// Assert
		let steps = &module.body().unwrap().steps;
		assert!(matches!(steps[0].instruction, Instruction::ForStart { exit: 4, .. }));
		assert!(matches!(steps[3].instruction, Instruction::ForNext { start: 0 }));
		assert!(matches!(steps[4].instruction, Instruction::Write(ref t) if t == "done"));
		assert!(matches!(steps[5].instruction, Instruction::Return));
	}

	#[rstest]
	fn test_if_jump_targets() {
		let module = compile("% if a:\nA\n% else:\nB\n% endif\n");

		let steps = &module.body().unwrap().steps;
		assert!(matches!(steps[0].instruction, Instruction::JumpUnless { target: 3, .. }));
		assert!(matches!(steps[2].instruction, Instruction::Jump(4)));
		assert!(matches!(steps[3].instruction, Instruction::Write(ref t) if t == "B\n"));
	}

	#[rstest]
	fn test_every_step_maps_back_to_its_line() {
		let module = compile("\n\n${error}\n");

		let emit = module
			.body()
			.unwrap()
			.steps
			.iter()
			.find(|s| matches!(s.instruction, Instruction::Emit { .. }))
			.unwrap();
		assert_eq!(module.source_line_for(emit.generated_line), Some(3));
		let listed = module.code.lines().nth(emit.generated_line - 1).unwrap();
		assert!(listed.contains("emit(error)"), "{}", listed);
	}

	#[rstest]
	fn test_defs_become_functions() {
		let module = compile("<%def name=\"greet(who)\">hi ${who}</%def>");

		let def = module.def("greet").unwrap();
		assert_eq!(def.name, "render_greet");
		assert_eq!(def.params.len(), 1);
		assert_eq!(module.def_names().collect::<Vec<_>>(), vec!["greet"]);
		assert!(module.code.contains("fn render_greet(who):"));
	}

	#[rstest]
	fn test_module_survives_json() {
		let module = compile("% for x in [1, 2]:\n${x | h}\n% endfor\n");

		let restored = GeneratedModule::from_json(&module.to_json().unwrap()).unwrap();

		assert_eq!(restored, module);
	}
}
