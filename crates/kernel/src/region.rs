//! Region expressions: Boolean formulas over surface half-spaces.
//!
//! A region is kept twice: as written (infix, for display and output) and as
//! reverse Polish notation for evaluation. Pure intersections ("simple"
//! regions) are evaluated by a short-circuit AND over the half-spaces; all
//! other regions run a stack machine over the RPN that skips right operands
//! whose value cannot change the result.

use std::fmt;

use cellspace_common::{Direction, FP_PRECISION, Position, SurfaceHandle, SurfaceIndex};
use cellspace_surface::{SurfaceError, SurfaceSet};
use smallvec::SmallVec;

/// One token of a region expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Halfspace(SurfaceHandle),
    LeftParen,
    RightParen,
    Complement,
    /// Implicit in written expressions; explicit in RPN.
    Intersection,
    Union,
}

impl Token {
    fn is_binary(self) -> bool {
        matches!(self, Token::Intersection | Token::Union)
    }

    fn precedence(self) -> u8 {
        match self {
            Token::Complement => 3,
            Token::Intersection => 2,
            Token::Union => 1,
            _ => 0,
        }
    }
}

/// Errors raised while building a region. All are load-time configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("invalid surface token '{0}'")]
    InvalidNumber(String),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("operator {op} is missing an operand")]
    MissingOperand { op: &'static str },
    #[error("expression leaves {0} values instead of one")]
    DanglingOperands(usize),
    #[error("empty parenthesized group")]
    EmptyGroup,
}

/// Where the surface crossing nearest along a ray lies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    /// Distance along the direction of flight; `f64::INFINITY` if none.
    pub distance: f64,
    /// The half-space being exited, as it appears in the region.
    pub surface: Option<SurfaceHandle>,
}

impl Boundary {
    pub const NONE: Boundary = Boundary {
        distance: f64::INFINITY,
        surface: None,
    };

    /// The half-space occupied just after the crossing.
    pub fn entering(&self) -> Option<SurfaceHandle> {
        self.surface.map(SurfaceHandle::flipped)
    }

    /// Offer a crossing; keeps the nearest, breaking near-ties (relative
    /// tolerance `FP_PRECISION`) in favour of the lowest surface index.
    fn offer(&mut self, distance: f64, surface: SurfaceHandle) {
        if !distance.is_finite() {
            return;
        }
        match self.surface {
            None => *self = Boundary { distance, surface: Some(surface) },
            Some(current) => {
                let tolerance = FP_PRECISION * self.distance;
                if self.distance - distance > tolerance
                    || ((distance - self.distance).abs() <= tolerance
                        && surface.index() < current.index())
                {
                    *self = Boundary { distance, surface: Some(surface) };
                }
            }
        }
    }
}

/// Jump taken when the left operand of a binary operator settles its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShortCircuit {
    /// RPN position of the operator.
    operator: u32,
    /// Left-operand value that decides the operator.
    decides_on: bool,
}

type EvalStack = SmallVec<[bool; 16]>;

/// A cell's spatial extent as a Boolean expression of half-spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    infix: Vec<Token>,
    rpn: Vec<Token>,
    simple: bool,
    /// Operands of a simple region, in written order.
    halfspaces: Vec<SurfaceHandle>,
    /// Per RPN position: set when the token closes a left operand.
    jumps: Vec<Option<ShortCircuit>>,
}

impl Region {
    /// Parse written region text. Signed integers are surface ids, `(` `)`
    /// group, `~` complements, `|` (or `:`) is union, and juxtaposition is
    /// intersection. Empty text is the whole of space.
    pub fn parse(text: &str, surfaces: &SurfaceSet) -> Result<Self, RegionError> {
        Self::from_tokens(tokenize(text, |id| surfaces.resolve(id))?)
    }

    /// Build a region from written (infix) tokens. Intersections may be left
    /// implicit.
    pub fn from_tokens(infix: Vec<Token>) -> Result<Self, RegionError> {
        let expanded = insert_intersections(&infix);
        let rpn = to_rpn(&expanded)?;
        if rpn.is_empty() && !infix.is_empty() {
            return Err(RegionError::EmptyGroup);
        }
        let jumps = short_circuit_table(&rpn)?;
        let simple = !rpn
            .iter()
            .any(|t| matches!(t, Token::Union | Token::Complement));
        let halfspaces = rpn
            .iter()
            .filter_map(|t| match t {
                Token::Halfspace(h) => Some(*h),
                _ => None,
            })
            .collect();
        Ok(Self {
            infix,
            rpn,
            simple,
            halfspaces,
            jumps,
        })
    }

    /// The region covering all of space.
    pub fn everywhere() -> Self {
        Self {
            infix: Vec::new(),
            rpn: Vec::new(),
            simple: true,
            halfspaces: Vec::new(),
            jumps: Vec::new(),
        }
    }

    /// True when the region is a pure intersection of half-spaces.
    pub fn is_simple(&self) -> bool {
        self.simple
    }

    pub fn infix(&self) -> &[Token] {
        &self.infix
    }

    pub fn rpn(&self) -> &[Token] {
        &self.rpn
    }

    /// Every half-space operand, in RPN order (may repeat surfaces).
    pub fn halfspaces(&self) -> impl Iterator<Item = SurfaceHandle> + '_ {
        self.rpn.iter().filter_map(|t| match t {
            Token::Halfspace(h) => Some(*h),
            _ => None,
        })
    }

    /// Evaluate the expression given the truth value of each half-space.
    pub fn evaluate(&self, mut halfspace: impl FnMut(SurfaceHandle) -> bool) -> bool {
        if self.simple {
            self.halfspaces.iter().all(|h| halfspace(*h))
        } else {
            self.evaluate_complex(&mut halfspace)
        }
    }

    /// Whether `r` lies in the region. `on_surface`, when given, pins the
    /// sense of that surface regardless of the computed value.
    pub fn contains(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> bool {
        self.evaluate(|h| halfspace_holds(surfaces, h, r, u, on_surface))
    }

    /// Nearest crossing along `u` at which containment changes.
    ///
    /// For a simple region the point is assumed inside and this is the
    /// nearest crossing of any bounding surface. For a complex region,
    /// crossings are tried in order of distance until containment flips.
    pub fn distance(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> Boundary {
        if self.simple {
            let mut best = Boundary::NONE;
            for &h in &self.halfspaces {
                let coincident = on_surface.is_some_and(|s| s.index() == h.index());
                best.offer(surfaces.distance(h, r, u, coincident), h);
            }
            best
        } else {
            self.distance_complex(surfaces, r, u, on_surface)
        }
    }

    fn distance_complex(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> Boundary {
        let inside = self.contains(surfaces, r, u, on_surface);

        let mut crossings: SmallVec<[(f64, SurfaceIndex); 16]> = SmallVec::new();
        for h in self.halfspaces() {
            let index = h.index();
            if crossings.iter().any(|(_, i)| *i == index) {
                continue;
            }
            let coincident = on_surface.is_some_and(|s| s.index() == index);
            let d = surfaces.distance(h, r, u, coincident);
            if d.is_finite() {
                crossings.push((d, index));
            }
        }

        // Each surface holds one pending crossing; a crossing that leaves
        // containment unchanged is replaced by that surface's next root.
        while let Some(next) = nearest_crossing(&crossings) {
            let (d, index) = crossings[next];
            let p = r + d * u;
            let heading_positive = u.dot(surfaces.get(index).normal(p)) > 0.0;
            let after = SurfaceHandle::new(index, heading_positive);
            if self.contains(surfaces, p, u, Some(after)) != inside {
                return Boundary {
                    distance: d,
                    surface: Some(after.flipped()),
                };
            }
            let further = surfaces.distance(after, p, u, true);
            if further.is_finite() && further > 0.0 {
                crossings[next].0 = d + further;
            } else {
                crossings.swap_remove(next);
            }
        }
        Boundary::NONE
    }

    fn evaluate_complex(&self, halfspace: &mut impl FnMut(SurfaceHandle) -> bool) -> bool {
        let mut stack = EvalStack::new();
        let n = self.rpn.len();
        let mut i = 0;
        while i < n {
            match self.rpn[i] {
                Token::Halfspace(h) => stack.push(halfspace(h)),
                Token::Complement => {
                    let top = pop(&mut stack);
                    stack.push(!top);
                }
                Token::Intersection => {
                    let b = pop(&mut stack);
                    let a = pop(&mut stack);
                    stack.push(a && b);
                }
                Token::Union => {
                    let b = pop(&mut stack);
                    let a = pop(&mut stack);
                    stack.push(a || b);
                }
                Token::LeftParen | Token::RightParen => {
                    unreachable!("parentheses never reach the RPN")
                }
            }
            // A settled left operand is also the operator's value; skip the
            // right operand and keep unwinding while that holds.
            let mut end = i;
            while let Some(jump) = self.jumps[end] {
                if stack.last().copied() != Some(jump.decides_on) {
                    break;
                }
                end = jump.operator as usize;
            }
            i = end + 1;
        }
        pop(&mut stack)
    }

    /// Plain stack evaluation with no short-circuiting.
    #[cfg(test)]
    fn evaluate_full(&self, mut halfspace: impl FnMut(SurfaceHandle) -> bool) -> bool {
        let mut stack = EvalStack::new();
        for token in &self.rpn {
            match *token {
                Token::Halfspace(h) => stack.push(halfspace(h)),
                Token::Complement => {
                    let top = pop(&mut stack);
                    stack.push(!top);
                }
                Token::Intersection | Token::Union => {
                    let b = pop(&mut stack);
                    let a = pop(&mut stack);
                    stack.push(if *token == Token::Union { a || b } else { a && b });
                }
                _ => unreachable!(),
            }
        }
        if self.rpn.is_empty() { true } else { pop(&mut stack) }
    }

    /// Render the written expression with user-facing surface ids.
    pub fn to_infix(&self, surfaces: &SurfaceSet) -> String {
        let mut out = String::new();
        let mut previous: Option<Token> = None;
        for token in &self.infix {
            let glue = matches!(previous, None | Some(Token::LeftParen | Token::Complement))
                || *token == Token::RightParen;
            if !glue {
                out.push(' ');
            }
            match token {
                Token::Halfspace(h) => out.push_str(&surfaces.signed_id(*h).to_string()),
                other => out.push_str(operator_symbol(*other)),
            }
            previous = Some(*token);
        }
        out
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Halfspace(h) => write!(f, "{}", h.raw()),
            other => f.write_str(operator_symbol(*other)),
        }
    }
}

fn operator_symbol(token: Token) -> &'static str {
    match token {
        Token::LeftParen => "(",
        Token::RightParen => ")",
        Token::Complement => "~",
        Token::Intersection => "&",
        Token::Union => "|",
        Token::Halfspace(_) => "",
    }
}

fn pop(stack: &mut EvalStack) -> bool {
    match stack.pop() {
        Some(v) => v,
        None => unreachable!("RPN operand counts are validated at construction"),
    }
}

/// Position of the crossing to try next: the nearest one, with crossings
/// within `FP_PRECISION` relative distance going to the lowest surface index.
fn nearest_crossing(crossings: &[(f64, SurfaceIndex)]) -> Option<usize> {
    let nearest = crossings.iter().map(|c| c.0).min_by(f64::total_cmp)?;
    let tolerance = FP_PRECISION * nearest;
    crossings
        .iter()
        .enumerate()
        .filter(|(_, c)| c.0 - nearest <= tolerance)
        .min_by_key(|(_, c)| c.1)
        .map(|(i, _)| i)
}

/// Sense test for one half-space, honouring a known on-surface handle.
fn halfspace_holds(
    surfaces: &SurfaceSet,
    h: SurfaceHandle,
    r: Position,
    u: Direction,
    on_surface: Option<SurfaceHandle>,
) -> bool {
    match on_surface {
        Some(s) if s == h => true,
        Some(s) if s == -h => false,
        _ => surfaces.sense(h, r, u) == h.is_positive(),
    }
}

/// Split region text into tokens, resolving signed surface ids.
pub(crate) fn tokenize(
    text: &str,
    mut resolve: impl FnMut(i32) -> Result<SurfaceHandle, SurfaceError>,
) -> Result<Vec<Token>, RegionError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LeftParen),
            ')' => tokens.push(Token::RightParen),
            '~' => tokens.push(Token::Complement),
            '|' | ':' => tokens.push(Token::Union),
            '+' | '-' | '0'..='9' => {
                let mut number = String::from(ch);
                while let Some(&(_, next)) = chars.peek() {
                    if !next.is_ascii_digit() {
                        break;
                    }
                    number.push(next);
                    chars.next();
                }
                let id: i32 = number
                    .parse()
                    .map_err(|_| RegionError::InvalidNumber(number.clone()))?;
                tokens.push(Token::Halfspace(resolve(id)?));
            }
            ch => return Err(RegionError::UnexpectedChar { ch, offset }),
        }
    }
    Ok(tokens)
}

/// Make juxtaposition explicit: an operand or `)` followed by an operand,
/// `(` or `~` gets an intersection between them.
fn insert_intersections(infix: &[Token]) -> Vec<Token> {
    let mut out = Vec::with_capacity(infix.len() * 2);
    for (i, token) in infix.iter().enumerate() {
        if i > 0 {
            let left = infix[i - 1];
            let closes = matches!(left, Token::Halfspace(_) | Token::RightParen);
            let opens = matches!(
                token,
                Token::Halfspace(_) | Token::LeftParen | Token::Complement
            );
            if closes && opens {
                out.push(Token::Intersection);
            }
        }
        out.push(*token);
    }
    out
}

/// Shunting-yard conversion. Complement is a prefix unary operator and binds
/// tighter than intersection, which binds tighter than union.
fn to_rpn(infix: &[Token]) -> Result<Vec<Token>, RegionError> {
    let mut output = Vec::with_capacity(infix.len());
    let mut operators: Vec<Token> = Vec::new();
    for &token in infix {
        match token {
            Token::Halfspace(_) => output.push(token),
            Token::Complement | Token::LeftParen => operators.push(token),
            Token::Intersection | Token::Union => {
                while let Some(&top) = operators.last() {
                    if top == Token::LeftParen || top.precedence() < token.precedence() {
                        break;
                    }
                    output.push(top);
                    operators.pop();
                }
                operators.push(token);
            }
            Token::RightParen => loop {
                match operators.pop() {
                    Some(Token::LeftParen) => break,
                    Some(op) => output.push(op),
                    None => return Err(RegionError::UnbalancedParentheses),
                }
            },
        }
    }
    while let Some(op) = operators.pop() {
        if op == Token::LeftParen {
            return Err(RegionError::UnbalancedParentheses);
        }
        output.push(op);
    }
    Ok(output)
}

/// Validate operand counts and record, for each left operand of a binary
/// operator, where evaluation may jump once that operand decides the result.
fn short_circuit_table(rpn: &[Token]) -> Result<Vec<Option<ShortCircuit>>, RegionError> {
    let mut jumps = vec![None; rpn.len()];
    // Start position of each pending operand's span.
    let mut starts: Vec<usize> = Vec::new();
    for (i, token) in rpn.iter().enumerate() {
        match *token {
            Token::Halfspace(_) => starts.push(i),
            Token::Complement => {
                if starts.is_empty() {
                    return Err(RegionError::MissingOperand { op: "~" });
                }
            }
            op if op.is_binary() => {
                let symbol = operator_symbol(op);
                let right = starts.pop().ok_or(RegionError::MissingOperand { op: symbol })?;
                let left = starts.pop().ok_or(RegionError::MissingOperand { op: symbol })?;
                jumps[right - 1] = Some(ShortCircuit {
                    operator: u32::try_from(i).unwrap_or(u32::MAX),
                    decides_on: op == Token::Union,
                });
                starts.push(left);
            }
            _ => return Err(RegionError::UnbalancedParentheses),
        }
    }
    match starts.len() {
        0 | 1 => Ok(jumps),
        n => Err(RegionError::DanglingOperands(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellspace_common::SurfaceId;
    use cellspace_surface::Surface;
    use glam::DVec3;
    use proptest::prelude::*;

    fn h(raw: i32) -> SurfaceHandle {
        SurfaceHandle::from_raw(raw).unwrap()
    }

    /// Surfaces 1..=3 as planes x=0, x=5 and y=0.
    fn planes() -> SurfaceSet {
        let mut set = SurfaceSet::new();
        set.insert(SurfaceId(1), Surface::XPlane { x0: 0.0 }).unwrap();
        set.insert(SurfaceId(2), Surface::XPlane { x0: 5.0 }).unwrap();
        set.insert(SurfaceId(3), Surface::YPlane { y0: 0.0 }).unwrap();
        set
    }

    #[test]
    fn slab_contains_and_distance() {
        let set = planes();
        let region = Region::parse("1 -2", &set).unwrap();
        assert!(region.is_simple());

        let u = DVec3::X;
        assert!(region.contains(&set, DVec3::new(2.0, 0.0, 0.0), u, None));
        assert!(!region.contains(&set, DVec3::new(6.0, 0.0, 0.0), u, None));

        let b = region.distance(&set, DVec3::new(2.0, 0.0, 0.0), u, None);
        assert!((b.distance - 3.0).abs() < 1e-12);
        assert_eq!(b.surface, Some(h(-2)));
        assert_eq!(b.entering(), Some(h(2)));
    }

    #[test]
    fn rpn_of_union_with_complement() {
        let set = planes();
        let region = Region::parse("(1 2) | ~3", &set).unwrap();
        assert!(!region.is_simple());
        assert_eq!(
            region.rpn(),
            &[
                Token::Halfspace(h(1)),
                Token::Halfspace(h(2)),
                Token::Intersection,
                Token::Halfspace(h(3)),
                Token::Complement,
                Token::Union,
            ]
        );
    }

    #[test]
    fn truth_table_for_documented_union() {
        // (1 2) | ~3 over every combination of the three senses.
        let set = planes();
        let region = Region::parse("(1 2) | ~3", &set).unwrap();
        for bits in 0u8..8 {
            let s = [bits & 1 != 0, bits & 2 != 0, bits & 4 != 0];
            let expected = (s[0] && s[1]) || !s[2];
            let value = |handle: SurfaceHandle| {
                let positive = s[handle.index().get()];
                if handle.is_positive() { positive } else { !positive }
            };
            assert_eq!(region.evaluate(value), expected, "senses {s:?}");
            assert_eq!(region.evaluate_full(value), expected, "senses {s:?}");
        }
    }

    #[test]
    fn colon_is_union_alias() {
        let set = planes();
        let a = Region::parse("(1 2):3", &set).unwrap();
        let b = Region::parse("(1 2)|3", &set).unwrap();
        assert_eq!(a.rpn(), b.rpn());
    }

    #[test]
    fn complement_binds_tighter_than_intersection() {
        let set = planes();
        let region = Region::parse("~1 2", &set).unwrap();
        assert_eq!(
            region.rpn(),
            &[
                Token::Halfspace(h(1)),
                Token::Complement,
                Token::Halfspace(h(2)),
                Token::Intersection,
            ]
        );
    }

    #[test]
    fn on_surface_overrides_computed_sense() {
        let set = planes();
        let region = Region::parse("1 -2", &set).unwrap();
        // Exactly on x=5 but numerically just outside.
        let r = DVec3::new(5.0 + 1e-9, 0.0, 0.0);
        assert!(!region.contains(&set, r, DVec3::X, None));
        assert!(region.contains(&set, r, DVec3::X, Some(h(-2))));
        assert!(!region.contains(&set, DVec3::new(2.0, 0.0, 0.0), DVec3::X, Some(h(2))));
    }

    #[test]
    fn point_on_boundary_uses_direction() {
        let set = planes();
        let region = Region::parse("1 -2", &set).unwrap();
        let r = DVec3::new(5.0, 0.0, 0.0);
        assert!(region.contains(&set, r, -DVec3::X, None));
        assert!(!region.contains(&set, r, DVec3::X, None));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        let set = planes();
        assert_eq!(
            Region::parse("(1 2", &set),
            Err(RegionError::UnbalancedParentheses)
        );
        assert_eq!(
            Region::parse("1 2)", &set),
            Err(RegionError::UnbalancedParentheses)
        );
        assert!(matches!(
            Region::parse("1 |", &set),
            Err(RegionError::MissingOperand { .. })
        ));
        assert!(matches!(
            Region::parse("~", &set),
            Err(RegionError::MissingOperand { .. })
        ));
        assert!(matches!(
            Region::parse("1 ()", &set),
            Err(RegionError::MissingOperand { .. })
        ));
        assert_eq!(Region::parse("()", &set), Err(RegionError::EmptyGroup));
        assert!(matches!(
            Region::parse("1 # 2", &set),
            Err(RegionError::UnexpectedChar { ch: '#', .. })
        ));
        assert!(matches!(
            Region::parse("1 9", &set),
            Err(RegionError::Surface(SurfaceError::UnknownId(_)))
        ));
        assert!(matches!(
            Region::parse("1 0", &set),
            Err(RegionError::Surface(SurfaceError::ZeroToken))
        ));
        assert!(matches!(
            Region::parse("1 -2147483648", &set),
            Err(RegionError::Surface(SurfaceError::UnknownId(_)))
        ));
    }

    #[test]
    fn empty_region_is_everywhere() {
        let set = planes();
        let region = Region::parse("  ", &set).unwrap();
        assert!(region.is_simple());
        assert!(region.contains(&set, DVec3::splat(1e9), DVec3::X, None));
        assert_eq!(region.distance(&set, DVec3::ZERO, DVec3::X, None), Boundary::NONE);
        assert_eq!(region, Region::everywhere());
    }

    #[test]
    fn infix_round_trips_through_display() {
        let set = planes();
        let region = Region::parse("( 1  -2 ) | ~ 3", &set).unwrap();
        assert_eq!(region.to_infix(&set), "(1 -2) | ~3");
        let again = Region::parse(&region.to_infix(&set), &set).unwrap();
        assert_eq!(again.rpn(), region.rpn());
    }

    #[test]
    fn distance_ties_prefer_lowest_surface_index() {
        let mut set = SurfaceSet::new();
        set.insert(SurfaceId(1), Surface::XPlane { x0: 1.0 }).unwrap();
        set.insert(SurfaceId(2), Surface::YPlane { y0: 1.0 }).unwrap();
        // Written order puts surface 2 first; the crossing is at the corner.
        let region = Region::parse("-2 -1", &set).unwrap();
        let u = DVec3::new(1.0, 1.0, 0.0).normalize();
        let b = region.distance(&set, DVec3::ZERO, u, None);
        assert_eq!(b.surface, Some(h(-1)));
        assert!((b.distance - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn complex_distance_skips_internal_crossings() {
        // Union of two abutting slabs: [0,5] in x or x>5 with y>0.
        let set = planes();
        let region = Region::parse("(1 -2) | (2 3)", &set).unwrap();
        let r = DVec3::new(1.0, 1.0, 0.0);
        let b = region.distance(&set, r, DVec3::X, None);
        // Crossing x=5 at y=1 stays inside the union, so no boundary ahead.
        assert_eq!(b, Boundary::NONE);

        let r = DVec3::new(1.0, -1.0, 0.0);
        let b = region.distance(&set, r, DVec3::X, None);
        assert!((b.distance - 4.0).abs() < 1e-12);
        assert_eq!(b.surface, Some(h(-2)));
    }

    /// Unit sphere (id 1) and the plane x = -0.5 (id 2).
    fn sphere_and_plane() -> SurfaceSet {
        let mut set = SurfaceSet::new();
        set.insert(SurfaceId(1), Surface::Sphere { x0: 0.0, y0: 0.0, z0: 0.0, r: 1.0 })
            .unwrap();
        set.insert(SurfaceId(2), Surface::XPlane { x0: -0.5 }).unwrap();
        set
    }

    #[test]
    fn complex_distance_reaches_far_side_of_sphere() {
        let set = sphere_and_plane();
        let region = Region::parse("-1 | -2", &set).unwrap();
        let r = DVec3::new(-2.0, 0.0, 0.0);
        assert!(region.contains(&set, r, DVec3::X, None));
        // Entering the sphere at x = -1 and leaving the half-space at
        // x = -0.5 both keep the point inside; the exit is x = 1.
        let b = region.distance(&set, r, DVec3::X, None);
        assert!((b.distance - 3.0).abs() < 1e-12);
        assert_eq!(b.surface, Some(h(-1)));
    }

    #[test]
    fn complex_distance_ties_prefer_lowest_surface_index() {
        let mut set = SurfaceSet::new();
        set.insert(SurfaceId(1), Surface::XPlane { x0: 1.0 + 4e-15 }).unwrap();
        set.insert(SurfaceId(2), Surface::YPlane { y0: 1.0 }).unwrap();
        let region = Region::parse("~(1 | 2)", &set).unwrap();
        assert!(!region.is_simple());
        let u = DVec3::new(1.0, 1.0, 0.0).normalize();
        let b = region.distance(&set, DVec3::ZERO, u, None);
        // Surface 2 is nearer by less than the relative tolerance.
        assert_eq!(b.surface, Some(h(-1)));
        assert!((b.distance - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn coincident_surface_is_not_recrossed() {
        let set = planes();
        let region = Region::parse("1 -2", &set).unwrap();
        let b = region.distance(&set, DVec3::ZERO, DVec3::X, Some(h(1)));
        assert!((b.distance - 5.0).abs() < 1e-12);
        assert_eq!(b.surface, Some(h(-2)));
    }

    #[derive(Debug, Clone)]
    enum Expr {
        Leaf(i32),
        Not(Box<Expr>),
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
    }

    impl Expr {
        fn eval(&self, senses: &[bool; 4]) -> bool {
            match self {
                Expr::Leaf(raw) => {
                    let positive = senses[(raw.unsigned_abs() - 1) as usize];
                    if *raw > 0 { positive } else { !positive }
                }
                Expr::Not(e) => !e.eval(senses),
                Expr::And(a, b) => a.eval(senses) && b.eval(senses),
                Expr::Or(a, b) => a.eval(senses) || b.eval(senses),
            }
        }

        fn write(&self, out: &mut Vec<Token>) {
            match self {
                Expr::Leaf(raw) => out.push(Token::Halfspace(h(*raw))),
                Expr::Not(e) => {
                    out.push(Token::Complement);
                    e.write_grouped(out);
                }
                Expr::And(a, b) => {
                    a.write_grouped(out);
                    b.write_grouped(out);
                }
                Expr::Or(a, b) => {
                    a.write_grouped(out);
                    out.push(Token::Union);
                    b.write_grouped(out);
                }
            }
        }

        fn write_grouped(&self, out: &mut Vec<Token>) {
            out.push(Token::LeftParen);
            self.write(out);
            out.push(Token::RightParen);
        }
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![1i32..=4, -4i32..=-1].prop_map(Expr::Leaf);
        leaf.prop_recursive(5, 32, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| Expr::Not(Box::new(e))),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::And(Box::new(a), Box::new(b))),
                (inner.clone(), inner).prop_map(|(a, b)| Expr::Or(Box::new(a), Box::new(b))),
            ]
        })
    }

    proptest! {
        #[test]
        fn rpn_matches_direct_infix_evaluation(expr in arb_expr(), senses in any::<[bool; 4]>()) {
            let mut tokens = Vec::new();
            expr.write(&mut tokens);
            let region = Region::from_tokens(tokens).unwrap();
            let value = |handle: SurfaceHandle| {
                let positive = senses[handle.index().get()];
                if handle.is_positive() { positive } else { !positive }
            };
            let expected = expr.eval(&senses);
            prop_assert_eq!(region.evaluate(value), expected);
            prop_assert_eq!(region.evaluate_full(value), expected);
        }

        #[test]
        fn simple_short_circuit_matches_full(
            raws in prop::collection::vec(prop_oneof![1i32..=4, -4i32..=-1], 1..8),
            senses in any::<[bool; 4]>(),
        ) {
            let tokens = raws.iter().map(|r| Token::Halfspace(h(*r))).collect();
            let region = Region::from_tokens(tokens).unwrap();
            prop_assert!(region.is_simple());
            let value = |handle: SurfaceHandle| {
                let positive = senses[handle.index().get()];
                if handle.is_positive() { positive } else { !positive }
            };
            prop_assert_eq!(region.evaluate(value), region.evaluate_full(value));
        }

        #[test]
        fn short_circuit_never_evaluates_more(expr in arb_expr(), senses in any::<[bool; 4]>()) {
            let mut tokens = Vec::new();
            expr.write(&mut tokens);
            let region = Region::from_tokens(tokens).unwrap();
            let mut lazy = 0usize;
            let mut full = 0usize;
            let sense = |handle: SurfaceHandle| {
                let positive = senses[handle.index().get()];
                if handle.is_positive() { positive } else { !positive }
            };
            region.evaluate(|handle| { lazy += 1; sense(handle) });
            region.evaluate_full(|handle| { full += 1; sense(handle) });
            prop_assert!(lazy <= full);
        }

        #[test]
        fn bounded_complex_region_always_has_an_exit(
            px in -2.5f64..0.5, py in -0.9f64..0.9,
            angle in 0.0f64..std::f64::consts::TAU,
        ) {
            let set = sphere_and_plane();
            let region = Region::parse("-1 | -2", &set).unwrap();
            let r = DVec3::new(px, py, 0.0);
            let u = DVec3::new(angle.cos(), angle.sin(), 0.0);
            prop_assume!(u.x > 0.1 && region.contains(&set, r, u, None));
            let b = region.distance(&set, r, u, None);
            // Any path heading towards +x leaves both the sphere and x < -0.5.
            prop_assert!(b.distance.is_finite());
            prop_assert!(b.surface.is_some());
            let after = r + (b.distance + 1e-7) * u;
            prop_assert!(!region.contains(&set, after, u, None));
        }

        #[test]
        fn complex_distance_crossing_flips_containment(
            px in 0.5f64..4.5, py in -3.0f64..3.0,
            angle in 0.0f64..std::f64::consts::TAU,
        ) {
            let set = planes();
            let region = Region::parse("(1 -2) | (2 3)", &set).unwrap();
            let r = DVec3::new(px, py, 0.0);
            let u = DVec3::new(angle.cos(), angle.sin(), 0.0);
            prop_assume!(py.abs() > 1e-6);
            let inside = region.contains(&set, r, u, None);
            let b = region.distance(&set, r, u, None);
            prop_assert!(!b.distance.is_nan() && b.distance >= 0.0);
            if let Some(exit) = b.surface {
                prop_assume!(b.distance > 1e-6);
                let before = r + (b.distance - 1e-7) * u;
                let after = r + (b.distance + 1e-7) * u;
                prop_assert_eq!(region.contains(&set, before, u, None), inside);
                prop_assert_ne!(region.contains(&set, after, u, None), inside);
                prop_assert!(region.halfspaces().any(|t| t.index() == exit.index()));
            }
        }
    }
}
