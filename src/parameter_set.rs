use serde::Serialize;

use crate::error::FilterError;
use crate::filter_data::{join_arguments, FilterIdentity};
use crate::parameter::{parse_one, Parameter};

/// Ordered parameters of one filter, decorative entries included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterParameterSet {
    pub identity: FilterIdentity,
    pub parameters: Vec<Parameter>,
}

impl FilterParameterSet {
    /// Parse a whole parameter block.
    ///
    /// Declarations are read until only whitespace remains. The first grammar
    /// error aborts the build and nothing parsed so far is returned.
    pub fn build(identity: FilterIdentity, block: &str) -> Result<Self, FilterError> {
        let mut parameters = Vec::new();
        let mut offset = 0;
        while let Some((parameter, consumed)) = parse_one(&block[offset..])? {
            parameters.push(parameter);
            offset += consumed;
        }
        Ok(Self {
            identity,
            parameters,
        })
    }

    /// Number of parameters that occupy a value slot.
    pub fn actual_count(&self) -> usize {
        self.parameters
            .iter()
            .filter(|parameter| parameter.is_actual())
            .count()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
    }

    /// One encoded value per actual parameter, in declaration order.
    pub fn to_ordered_values(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter_map(Parameter::current_value)
            .collect()
    }

    /// Apply decoded values to the actual parameters in lockstep.
    ///
    /// Runs out of values or a color channel mismatch abort with
    /// [`FilterError::Mismatch`]. Parameters updated before the failure keep
    /// their new value; discard the set on error. Surplus values are ignored.
    pub fn apply_ordered_values<S: AsRef<str>>(&mut self, values: &[S]) -> Result<(), FilterError> {
        let mut remaining = values.iter();
        for parameter in self
            .parameters
            .iter_mut()
            .filter(|parameter| parameter.is_actual())
        {
            let value = remaining.next().ok_or_else(|| {
                FilterError::mismatch(format!(
                    "got {} value(s) but parameter '{}' has no value left",
                    values.len(),
                    parameter.name
                ))
            })?;
            parameter.apply_value(value.as_ref())?;
        }
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) {
        for parameter in &mut self.parameters {
            parameter.reset();
        }
    }

    /// Current values joined the way the engine expects its arguments.
    pub fn command_arguments(&self) -> String {
        join_arguments(&self.to_ordered_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterKind;

    const BLOCK: &str = "Radius = int(3,1,10),\n\
        sep = separator(),\n\
        Info = note(\"Tweak the radius\"),\n\
        Tint = color(255,128,0,200),\n\
        Mode = choice(1,\"Fast\",\"Accurate\"),\n\
        Label = text(\"hello\"),\n\
        Home = link(\"Docs\",\"https://example.org\"),\n\
        Apply = button()\n";

    fn identity() -> FilterIdentity {
        FilterIdentity::new("Smooth", "fx_smooth", "fx_smooth_preview")
    }

    fn built() -> FilterParameterSet {
        FilterParameterSet::build(identity(), BLOCK).expect("block should parse")
    }

    #[test]
    fn build_keeps_decorative_parameters_in_order() {
        let set = built();
        let names = set
            .parameters
            .iter()
            .map(|parameter| parameter.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["Radius", "sep", "Info", "Tint", "Mode", "Label", "Home", "Apply"]
        );
        assert_eq!(set.actual_count(), 5);
    }

    #[test]
    fn empty_block_builds_an_empty_set() {
        let set = FilterParameterSet::build(identity(), "  \n").expect("blank block is valid");
        assert!(set.parameters.is_empty());
        assert!(set.to_ordered_values().is_empty());
    }

    #[test]
    fn grammar_error_discards_the_set() {
        let error = FilterParameterSet::build(identity(), "A = int(1,0,2), B = gizmo(1)")
            .expect_err("unknown type should fail the build");
        assert!(matches!(error, FilterError::Grammar { .. }));
    }

    #[test]
    fn ordered_values_skip_decorative_entries() {
        assert_eq!(
            built().to_ordered_values(),
            vec!["3", "255,128,0,200", "1", "hello", "0"]
        );
        assert_eq!(built().command_arguments(), "3,255,128,0,200,1,hello,0");
    }

    #[test]
    fn applying_emitted_values_is_a_fixed_point() {
        let mut set = built();
        set.apply_ordered_values(&["7", "1,2,3,4", "0", "multi\nline", "1"])
            .expect("values should apply");
        let before = set.clone();
        let values = set.to_ordered_values();
        set.apply_ordered_values(&values)
            .expect("own values should apply");
        assert_eq!(set.to_ordered_values(), values);
        assert_eq!(
            set.get("Label").map(|parameter| parameter.kind.clone()),
            before.get("Label").map(|parameter| parameter.kind.clone())
        );
    }

    #[test]
    fn fractional_values_survive_the_fixed_point() {
        let mut set = FilterParameterSet::build(identity(), "Amount = float(0.1,0,1)")
            .expect("block should parse");
        set.apply_ordered_values(&["0.3333333"]).expect("apply");
        let values = set.to_ordered_values();
        set.apply_ordered_values(&values).expect("apply");
        assert_eq!(set.to_ordered_values(), values);
    }

    #[test]
    fn choice_defaults_outside_the_labels_survive_the_fixed_point() {
        let mut set =
            FilterParameterSet::build(identity(), "Mode = choice(3,\"A\",\"B\"), Empty = choice(0)")
                .expect("block should parse");
        let before = set.to_ordered_values();
        assert_eq!(before, vec!["3", "0"]);
        set.apply_ordered_values(&before).expect("own values should apply");
        assert_eq!(set.to_ordered_values(), before);
    }

    #[test]
    fn too_few_values_is_a_mismatch() {
        let mut set = built();
        let error = set
            .apply_ordered_values(&["9", "1,1,1,1"])
            .expect_err("missing values should fail");
        assert!(matches!(error, FilterError::Mismatch { .. }));
        // Parameters before the failure were already updated.
        assert_eq!(set.get("Radius").and_then(Parameter::current_value).as_deref(), Some("9"));
    }

    #[test]
    fn color_channel_mismatch_aborts_apply() {
        let mut set = built();
        let error = set
            .apply_ordered_values(&["9", "1,1,1", "0", "x", "0"])
            .expect_err("color without alpha should fail");
        assert!(matches!(error, FilterError::Mismatch { .. }));
    }

    #[test]
    fn surplus_values_are_ignored() {
        let mut set = built();
        set.apply_ordered_values(&["2", "0,0,0,0", "0", "t", "0", "extra"])
            .expect("surplus values are tolerated");
        assert_eq!(set.to_ordered_values()[0], "2");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut set = built();
        set.apply_ordered_values(&["2", "0,0,0,0", "0", "t", "0"])
            .expect("values should apply");
        set.reset_to_defaults();
        assert_eq!(set.to_ordered_values(), built().to_ordered_values());
        assert!(matches!(
            set.get("Label").map(|parameter| &parameter.kind),
            Some(ParameterKind::Text { value, .. }) if value.current.is_none()
        ));
    }
}
