//! Filter plugins

use satellite_config::PluginConfig;
use satellite_filter::{Filter, MetadataFilter, MetadataFilterConfig, NoopFilter};

use super::typed;
use crate::error::Result;
use crate::registry::{BuildContext, Category, PluginFactory, invalid};

pub struct NoopFilterFactory;

impl PluginFactory<Box<dyn Filter>> for NoopFilterFactory {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn description(&self) -> &'static str {
        "Leaves the output context untouched."
    }

    fn create(&self, _config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<Box<dyn Filter>> {
        Ok(Box::new(NoopFilter::new()))
    }
}

pub struct MetadataFilterFactory;

impl PluginFactory<Box<dyn Filter>> for MetadataFilterFactory {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn description(&self) -> &'static str {
        "Adds a labelled copy of the source event to the output context when its \
         metadata matches the configured conditions. The copy can be retagged with \
         another event type or kept local."
    }

    fn default_config(&self) -> &'static str {
        r#"
# Name of the added event in the output context
output_name: labelled
# Metadata merged into the copy
labels: {}
# Whether the copy is forwarded upstream
remote: true
# all | any
match_mode: all
# Each: {key, operator: eq|ne|contains|starts_with|regex|exists, value}
conditions: []
"#
    }

    fn create(&self, config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<Box<dyn Filter>> {
        let cfg: MetadataFilterConfig = typed(Category::Filter, self.name(), config)?;
        cfg.validate()
            .map_err(|e| invalid(Category::Filter, self.name(), e))?;
        Ok(Box::new(MetadataFilter::new(cfg)?))
    }
}
