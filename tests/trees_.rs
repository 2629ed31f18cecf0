#![allow(dead_code)]

use lignin_live::{Element, Node};

/// Small deterministic xorshift generator, so failures reproduce from the seed alone.
pub struct Rng(u64);

impl Rng {
	pub fn new(seed: u64) -> Self {
		Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
	}

	pub fn next(&mut self) -> u64 {
		let mut x = self.0;
		x ^= x << 13;
		x ^= x >> 7;
		x ^= x << 17;
		self.0 = x;
		x
	}

	pub fn below(&mut self, n: usize) -> usize {
		(self.next() % n as u64) as usize
	}

	pub fn pick<'a>(&mut self, options: &[&'a str]) -> &'a str {
		options[self.below(options.len())]
	}
}

/// A random element tree. Keys are drawn from a small set so that duplicates and moves are common.
pub fn tree(rng: &mut Rng, depth: usize) -> Node {
	let mut element = Element::new(rng.pick(&["div", "span", "ul"]));
	if rng.below(3) == 0 {
		element = element.attribute("class", rng.pick(&["a", "b", "c"]));
	}
	if rng.below(4) == 0 {
		element = element.attribute("title", rng.pick(&["x", "y"]));
	}
	if depth > 0 {
		for _ in 0..rng.below(5) {
			let child = match rng.below(6) {
				0 | 1 => Node::text(rng.pick(&["one", "two", "three"])),
				2 => Node::driver(rng.pick(&["left", "right"])),
				3 => match tree(rng, depth - 1) {
					Node::Element(element) => element.key(rng.pick(&["k1", "k2", "k3", "k4"])).into(),
					other => other,
				},
				_ => tree(rng, depth - 1),
			};
			element = element.child(child);
		}
	}
	element.into()
}
